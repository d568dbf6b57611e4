//! Models command - download and manage the receipt model files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use rcpt_core::RcptConfig;

use super::load_config;

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List the model files
    List,

    /// Download model files
    Download(DownloadArgs),

    /// Check model status
    Status(DirArgs),

    /// Remove downloaded model files
    Clean(DirArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Hugging Face repository to download from
    #[arg(long)]
    repo: Option<String>,

    /// Force re-download even if files exist
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct DirArgs {
    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

/// One file the extractor loads.
struct ModelFile {
    filename: String,
    description: &'static str,
}

pub async fn run(args: ModelsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::List => {
            let config = load_config(config_path, None)?;
            list_models(&config)
        }
        ModelsCommand::Download(download_args) => {
            let config = load_config(config_path, download_args.output.clone())?;
            download_models(&config, download_args).await
        }
        ModelsCommand::Status(dir_args) => {
            let config = load_config(config_path, dir_args.model_dir)?;
            check_status(&config)
        }
        ModelsCommand::Clean(dir_args) => {
            let config = load_config(config_path, dir_args.model_dir)?;
            clean_models(&config)
        }
    }
}

/// Default model directory when no config file names one.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rcpt")
        .join("models")
}

fn model_files(config: &RcptConfig) -> Vec<ModelFile> {
    let model = &config.model;
    vec![
        ModelFile {
            filename: model.encoder_model.clone(),
            description: "Vision encoder (ONNX)",
        },
        ModelFile {
            filename: model.decoder_model.clone(),
            description: "Text decoder (ONNX)",
        },
        ModelFile {
            filename: model.tokenizer.clone(),
            description: "Tokenizer vocabulary and special tokens",
        },
        ModelFile {
            filename: model.model_config.clone(),
            description: "Model configuration (decoder length)",
        },
    ]
}

fn download_url(repo: &str, filename: &str) -> String {
    format!("https://huggingface.co/{}/resolve/main/{}", repo, filename)
}

/// Downloads fetch files by name, so the repository must publish the ONNX
/// export, not only the PyTorch checkpoint.
fn onnx_export_note(config: &RcptConfig) -> String {
    format!(
        "The repository must publish an ONNX export ({} and {}). \
         If it only holds PyTorch weights, export them or pass --repo <id>.",
        config.model.encoder_model, config.model.decoder_model
    )
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn list_models(config: &RcptConfig) -> anyhow::Result<()> {
    println!("{}", style("Receipt Model Files").bold());
    println!(
        "Source: {}",
        style(format!("https://huggingface.co/{}", config.model.repo)).cyan()
    );
    println!();

    for file in model_files(config) {
        println!("    {:<24} {}", file.filename, style(file.description).dim());
    }

    println!();
    println!("{}", style(onnx_export_note(config)).yellow());

    println!();
    println!("Commands:");
    println!("  rcpt models download              Download into {}", config.model.model_dir.display());
    println!("  rcpt models download --repo <id>  Download from another repository");
    println!("  rcpt config set model.repo <id>   Change the default repository");

    Ok(())
}

async fn download_models(config: &RcptConfig, args: DownloadArgs) -> anyhow::Result<()> {
    let output_dir = &config.model.model_dir;
    let repo = args.repo.as_deref().unwrap_or(&config.model.repo);
    fs::create_dir_all(output_dir)?;

    println!(
        "{} Downloading {} to {}",
        style("ℹ").blue(),
        style(repo).cyan().bold(),
        output_dir.display()
    );
    println!();

    let client = reqwest::Client::builder()
        .user_agent(concat!("rcpt-cli/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(600))
        .build()?;

    let multi_progress = MultiProgress::new();
    let mut success_count = 0;
    let mut skip_count = 0;
    let mut error_count = 0;

    for file in model_files(config) {
        let path = output_dir.join(&file.filename);

        if path.exists() && !args.force {
            let size = fs::metadata(&path)?.len();
            if size > 0 {
                println!(
                    "  {} {} (already exists, {})",
                    style("✓").green(),
                    file.filename,
                    format_size(size)
                );
                skip_count += 1;
                continue;
            }
        }

        let pb = multi_progress.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {msg:<30} [{bar:25.cyan/blue}] {bytes}/{total_bytes}")?
                .progress_chars("=>-"),
        );
        pb.set_message(file.filename.clone());

        match download_file(&client, &download_url(repo, &file.filename), &path, &pb).await {
            Ok(()) => {
                pb.finish_with_message(format!("{} {}", style("✓").green(), file.filename));
                success_count += 1;
            }
            Err(e) => {
                pb.finish_with_message(format!("{} {} - {}", style("✗").red(), file.filename, e));
                error_count += 1;
            }
        }
    }

    println!();

    if error_count == 0 {
        println!("{} Models ready!", style("✓").green().bold());
        if skip_count > 0 {
            println!(
                "   {} downloaded, {} already present",
                success_count, skip_count
            );
        }
    } else {
        println!(
            "{} Download completed with errors",
            style("⚠").yellow().bold()
        );
        println!(
            "   {} downloaded, {} skipped, {} failed",
            success_count, skip_count, error_count
        );
        println!("   {}", onnx_export_note(config));
        println!();
        println!("Retry with: rcpt models download --force");
    }

    println!();
    check_status(config)?;

    if error_count > 0 {
        anyhow::bail!("{} model file(s) failed to download", error_count);
    }

    Ok(())
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    pb: &ProgressBar,
) -> anyhow::Result<()> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }

    if let Some(content_length) = response.content_length() {
        pb.set_length(content_length);
    }

    // Stream into a temp file, renamed once complete
    let temp_path = temp_path(path);
    let mut file = File::create(&temp_path)?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    Ok(())
}

fn check_status(config: &RcptConfig) -> anyhow::Result<()> {
    let model_dir = &config.model.model_dir;

    println!("{}", style("Model Status").bold());
    println!("Directory: {}", model_dir.display());
    println!();

    let mut all_present = true;
    let mut total_size: u64 = 0;

    for file in model_files(config) {
        let path = model_dir.join(&file.filename);
        let (status, size_str) = if path.exists() {
            let size = fs::metadata(&path)?.len();
            total_size += size;

            if size > 0 {
                (style("✓").green(), format_size(size))
            } else {
                all_present = false;
                (style("⚠").yellow(), "empty".to_string())
            }
        } else {
            all_present = false;
            (style("✗").red(), "missing".to_string())
        };

        println!("    {} {:<24} {:>10}", status, file.filename, size_str);
    }

    println!();
    if all_present {
        println!(
            "    {} Ready ({} total)",
            style("✓").green(),
            format_size(total_size)
        );
    } else {
        println!(
            "    {} Run 'rcpt models download' to download",
            style("⚠").yellow()
        );
    }

    Ok(())
}

fn clean_models(config: &RcptConfig) -> anyhow::Result<()> {
    let model_dir = &config.model.model_dir;

    if !model_dir.exists() {
        println!("{} No model files to remove.", style("ℹ").blue());
        return Ok(());
    }

    let mut total_removed = 0;
    let mut total_freed: u64 = 0;

    for file in model_files(config) {
        let path = model_dir.join(&file.filename);
        if path.exists() {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            fs::remove_file(&path)?;
            total_removed += 1;
            total_freed += size;
            println!("  {} Removed {}", style("✓").green(), file.filename);
        }
    }

    // Leftovers from interrupted downloads
    for entry in fs::read_dir(model_dir)?.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "tmp") {
            fs::remove_file(&path)?;
        }
    }

    if total_removed > 0 {
        println!();
        println!(
            "{} Removed {} files, freed {}",
            style("✓").green(),
            total_removed,
            format_size(total_freed)
        );
    } else {
        println!("{} No model files to remove.", style("ℹ").blue());
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1}GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_download_url() {
        assert_eq!(
            download_url("debu-das/donut_receipt_v1.20", "tokenizer.json"),
            "https://huggingface.co/debu-das/donut_receipt_v1.20/resolve/main/tokenizer.json"
        );
    }

    #[test]
    fn test_onnx_export_note_names_graphs() {
        let note = onnx_export_note(&RcptConfig::default());
        assert!(note.contains("encoder_model.onnx"));
        assert!(note.contains("decoder_model.onnx"));
        assert!(note.contains("--repo"));
    }

    #[test]
    fn test_temp_path_keeps_extension() {
        assert_eq!(
            temp_path(Path::new("/m/encoder_model.onnx")),
            PathBuf::from("/m/encoder_model.onnx.tmp")
        );
    }

    #[test]
    fn test_model_files_follow_config() {
        let mut config = RcptConfig::default();
        config.model.decoder_model = "decoder_q8.onnx".to_string();

        let names: Vec<String> = model_files(&config).into_iter().map(|f| f.filename).collect();
        assert_eq!(
            names,
            vec!["encoder_model.onnx", "decoder_q8.onnx", "tokenizer.json", "config.json"]
        );
    }

    #[test]
    fn test_clean_removes_models_and_partials() {
        let dir = tempfile::tempdir().unwrap();
        let config = RcptConfig::default().with_model_dir(dir.path().to_path_buf());
        fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();
        fs::write(dir.path().join("encoder_model.onnx.tmp"), "partial").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        clean_models(&config).unwrap();

        assert!(!dir.path().join("tokenizer.json").exists());
        assert!(!dir.path().join("encoder_model.onnx.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2_500), "2.5KB");
        assert_eq!(format_size(1_300_000_000), "1.3GB");
    }
}
