//! Serve command - browser upload page backed by the extractor.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use console::style;
use serde::Serialize;
use tracing::{info, warn};

use rcpt_core::summary::SummaryLine;
use rcpt_core::{
    create_extractor_from_dir, summarize, ExtractionMetadata, ReceiptExtractor, StructuredRecord,
    TextCodec, VisionDecoder,
};

use super::load_config;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (default from config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct ExtractResponse {
    record: StructuredRecord,
    summary: SummaryView,
    metadata: ExtractionMetadata,
}

#[derive(Serialize)]
struct SummaryView {
    text: String,
    lines: Vec<SummaryLine>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path, args.model_dir)?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", bind, e))?;

    // Load once; every request shares the same sessions
    let extractor = create_extractor_from_dir(&config).map_err(|e| {
        anyhow::anyhow!(
            "{}\n\nRun 'rcpt models download' to fetch the model files.",
            e
        )
    })?;

    let app = router(Arc::new(extractor), config.server.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!(
        "{} Receipt parser listening on http://{}",
        style("✓").green(),
        listener.local_addr()?
    );
    info!(addr = %addr, "Upload server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Upload server shutting down");
        })
        .await?;

    Ok(())
}

fn router<M, T>(extractor: Arc<ReceiptExtractor<M, T>>, max_upload_bytes: usize) -> Router
where
    M: VisionDecoder + 'static,
    T: TextCodec + 'static,
{
    Router::new()
        .route("/", get(serve_upload_page))
        .route("/api/extract", post(extract_receipt::<M, T>))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(extractor)
}

async fn serve_upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE_HTML)
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

async fn extract_receipt<M, T>(
    State(extractor): State<Arc<ReceiptExtractor<M, T>>>,
    mut multipart: Multipart,
) -> Response
where
    M: VisionDecoder + 'static,
    T: TextCodec + 'static,
{
    let mut file_data: Option<(String, Vec<u8>)> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().unwrap_or("receipt").to_string();
                match field.bytes().await {
                    Ok(bytes) => file_data = Some((filename, bytes.to_vec())),
                    Err(e) => {
                        warn!("Failed to read upload bytes: {e}");
                        return error_response(e.status(), e.body_text());
                    }
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed upload: {e}");
                return error_response(e.status(), e.body_text());
            }
        }
    }

    let Some((filename, bytes)) = file_data.filter(|(_, bytes)| !bytes.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided.");
    };

    info!(filename = %filename, size = bytes.len(), "Receipt received");

    let result = tokio::task::spawn_blocking(move || extractor.extract_bytes(&bytes)).await;

    match result {
        Ok(Ok(result)) => {
            let summary = summarize(&result.record);
            let response = ExtractResponse {
                summary: SummaryView {
                    text: summary.to_text(),
                    lines: summary.lines(),
                },
                record: result.record,
                metadata: result.metadata,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(e)) => {
            warn!(filename = %filename, "Extraction failed: {e}");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(e) => {
            warn!("Extraction task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Extraction task failed.")
        }
    }
}

const UPLOAD_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Receipt Parser</title>
  <style>
    * { box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', system-ui, sans-serif;
      background: #fafaf9; color: #1c1917;
      max-width: 760px; margin: 0 auto; padding: 32px 24px;
    }
    h1 { font-size: 26px; margin-bottom: 4px; }
    p.hint { color: #78716c; font-size: 14px; margin-top: 0; }
    form { display: flex; gap: 12px; align-items: center; margin: 24px 0; }
    button {
      padding: 10px 20px; border: none; border-radius: 8px;
      background: #4a7c59; color: white; font-size: 15px; cursor: pointer;
    }
    button:disabled { background: #a8a29e; cursor: wait; }
    img#preview { max-width: 100%; max-height: 420px; border-radius: 8px; display: none; }
    pre { background: #f5f5f4; padding: 16px; border-radius: 8px; overflow-x: auto; }
    .error {
      background: #fef2f2; color: #991b1b; border: 1px solid #fecaca;
      padding: 12px 16px; border-radius: 8px; display: none;
    }
    ul { list-style: none; padding-left: 0; }
    li.item { padding-left: 24px; }
  </style>
</head>
<body>
  <h1>Receipt Parser</h1>
  <p class="hint">Upload a PNG or JPEG receipt to extract its fields.</p>

  <form id="upload">
    <input type="file" id="file" name="file" accept="image/png,image/jpeg" required>
    <button type="submit" id="submit">Submit</button>
  </form>

  <img id="preview" alt="Uploaded receipt">
  <div class="error" id="error"></div>

  <div id="result" style="display:none">
    <h2>Extracted Information</h2>
    <pre id="record"></pre>
    <h2>Summary</h2>
    <ul id="summary"></ul>
  </div>

  <script>
    const form = document.getElementById('upload');
    const fileInput = document.getElementById('file');
    const submit = document.getElementById('submit');
    const preview = document.getElementById('preview');
    const errorBox = document.getElementById('error');
    const result = document.getElementById('result');

    fileInput.addEventListener('change', () => {
      const file = fileInput.files[0];
      if (file) {
        preview.src = URL.createObjectURL(file);
        preview.style.display = 'block';
      }
      result.style.display = 'none';
      errorBox.style.display = 'none';
    });

    function renderLine(line) {
      const li = document.createElement('li');
      if (line.kind === 'field') {
        const label = document.createElement('strong');
        label.textContent = line.label + ': ';
        li.appendChild(label);
        li.appendChild(document.createTextNode(line.value));
      } else if (line.kind === 'heading') {
        const label = document.createElement('strong');
        label.textContent = line.label + ':';
        li.appendChild(label);
      } else {
        li.className = 'item';
        li.textContent = line.text;
      }
      return li;
    }

    form.addEventListener('submit', async (event) => {
      event.preventDefault();
      const file = fileInput.files[0];
      if (!file) return;

      submit.disabled = true;
      submit.textContent = 'Processing...';
      errorBox.style.display = 'none';
      result.style.display = 'none';

      try {
        const body = new FormData();
        body.append('file', file);
        const response = await fetch('/api/extract', { method: 'POST', body });
        const data = await response.json();

        if (!response.ok) {
          throw new Error(data.error || ('HTTP ' + response.status));
        }

        document.getElementById('record').textContent = JSON.stringify(data.record, null, 2);
        const summary = document.getElementById('summary');
        summary.replaceChildren(...data.summary.lines.map(renderLine));
        result.style.display = 'block';
      } catch (err) {
        errorBox.textContent = 'Extraction failed: ' + err.message;
        errorBox.style.display = 'block';
      } finally {
        submit.disabled = false;
        submit.textContent = 'Submit';
      }
    });
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use ndarray::{ArrayD, IxDyn};
    use pretty_assertions::assert_eq;
    use rcpt_core::models::config::DecoderConfig;
    use rcpt_core::{DecodeParams, Encoding, ExtractionError, SpecialTokens};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use tower::ServiceExt;

    const VOCAB: &[&str] = &["<unk>", "<pad>", "</s>", "<s_cord-v2>", "<s_vendor>", "Acme", "</s_vendor>"];

    struct FakeModel;

    impl VisionDecoder for FakeModel {
        fn encode(&self, _image: &DynamicImage) -> Result<Encoding, ExtractionError> {
            Ok(Encoding::new(ArrayD::zeros(IxDyn(&[1, 1, 1]))))
        }

        fn decode(&self, _encoding: &Encoding, params: &DecodeParams) -> Result<Vec<u32>, ExtractionError> {
            let mut ids = params.seed.clone();
            ids.extend([4, 5, 6, 2]);
            Ok(ids)
        }

        fn max_decoder_positions(&self) -> usize {
            16
        }
    }

    struct FakeCodec(SpecialTokens);

    impl TextCodec for FakeCodec {
        fn encode_prompt(&self, _prompt: &str) -> Result<Vec<u32>, ExtractionError> {
            Ok(vec![3])
        }

        fn decode_ids(&self, ids: &[u32]) -> Result<String, ExtractionError> {
            Ok(ids.iter().map(|&i| VOCAB[i as usize]).collect())
        }

        fn special_tokens(&self) -> &SpecialTokens {
            &self.0
        }
    }

    fn app() -> Router {
        let codec = FakeCodec(SpecialTokens {
            eos: "</s>".to_string(),
            eos_id: 2,
            pad: "<pad>".to_string(),
            pad_id: Some(1),
            unk: "<unk>".to_string(),
            unk_id: Some(0),
        });
        let extractor = ReceiptExtractor::new(FakeModel, codec, &DecoderConfig::default());
        router(Arc::new(extractor), 1024 * 1024)
    }

    fn png() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn upload(field: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(b"--XBOUNDARY\r\n");
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"receipt.png\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                field
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");

        Request::builder()
            .method("POST")
            .uri("/api/extract")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_extract_png() {
        let (status, body) = send(upload("file", &png())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"], json!({"vendor": "Acme"}));
        assert_eq!(
            body["summary"]["text"],
            json!("Invoice Number: N/A\nVendor: Acme\nTotal Amount: N/A\nItems Purchased:\n    \n")
        );
        assert_eq!(body["summary"]["lines"][1], json!({"kind": "field", "label": "Vendor", "value": "Acme"}));
        assert_eq!(body["summary"]["lines"][3], json!({"kind": "heading", "label": "Items Purchased"}));
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_unprocessable() {
        let (status, body) = send(upload("file", b"GIF89a not really")).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("unsupported image format"));
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let (status, body) = send(upload("other", &png())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No file provided."}));
    }

    #[tokio::test]
    async fn test_health_and_page() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("accept=\"image/png,image/jpeg\""));
    }
}
