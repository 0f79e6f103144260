use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use dotenvy::dotenv;
use serde::Serialize;
use tracing::{error, info};

use character_reference_studio::config::CONFIG;
use character_reference_studio::generation::{Automatic1111Backend, VariationGenerator};
use character_reference_studio::llm::media::strip_data_url_prefix;
use character_reference_studio::llm::ProviderRegistry;
use character_reference_studio::prompt::PromptSynthesizer;
use character_reference_studio::reference::{build_reference_set, reference_plan, ReferenceSet};
use character_reference_studio::upload::{analyze_upload, image_to_data_url, read_image_file};
use character_reference_studio::utils::logging::init_logging;
use character_reference_studio::vision::VisionDescriber;

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    image_path: PathBuf,
    output_dir: Option<PathBuf>,
    description: Option<String>,
    prompts_only: bool,
}

#[derive(Debug, Serialize)]
struct Manifest {
    created_at: String,
    source_image: String,
    description: String,
    files: Vec<ManifestFile>,
}

#[derive(Debug, Serialize)]
struct ManifestFile {
    category: String,
    key: String,
    path: String,
}

fn usage() -> &'static str {
    "Usage: character-reference <image> [--output-dir <dir>] [--description <text>] [--prompts-only]"
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut image_path: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;
    let mut description: Option<String> = None;
    let mut prompts_only = false;

    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--output-dir" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --output-dir"))?;
                output_dir = Some(PathBuf::from(value));
            }
            "--description" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --description"))?;
                description = Some(value.clone());
            }
            "--prompts-only" => {
                prompts_only = true;
            }
            "--help" | "-h" => {
                return Err(anyhow!(usage()));
            }
            other if other.starts_with("--") => {
                return Err(anyhow!("Unknown argument: {other}\n{}", usage()));
            }
            other => {
                if image_path.is_some() {
                    return Err(anyhow!("Only one image may be given\n{}", usage()));
                }
                image_path = Some(PathBuf::from(other));
            }
        }
        index += 1;
    }

    let image_path = image_path.ok_or_else(|| anyhow!("An image path is required\n{}", usage()))?;

    Ok(CliArgs {
        image_path,
        output_dir,
        description,
        prompts_only,
    })
}

fn write_reference_set(
    output_dir: &Path,
    set: &ReferenceSet,
    source_image: &Path,
    description: &str,
) -> Result<PathBuf> {
    let mut files = Vec::new();
    for (category, key, images) in set.entries() {
        let category_dir = output_dir.join(category.as_str());
        std::fs::create_dir_all(&category_dir)
            .with_context(|| format!("Failed to create {}", category_dir.display()))?;

        for (index, image) in images.iter().enumerate() {
            let bytes = general_purpose::STANDARD
                .decode(strip_data_url_prefix(image))
                .with_context(|| format!("Backend returned invalid base64 for {key}"))?;
            let path = category_dir.join(format!("{}_{}.png", key, index + 1));
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            files.push(ManifestFile {
                category: category.to_string(),
                key: key.to_string(),
                path: path.display().to_string(),
            });
        }
    }

    let manifest = Manifest {
        created_at: Utc::now().to_rfc3339(),
        source_image: source_image.display().to_string(),
        description: description.to_string(),
        files,
    };
    let manifest_path = output_dir.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
    Ok(manifest_path)
}

async fn run(cli: CliArgs) -> Result<()> {
    let registry = ProviderRegistry::from_config(&CONFIG);
    let synthesizer = Arc::new(PromptSynthesizer::new(&registry, &CONFIG));

    let bytes = read_image_file(&cli.image_path).await?;
    let invalid_image = || format!("Invalid image {}", cli.image_path.display());
    let (image_url, description) = match cli.description.clone() {
        Some(description) => (
            image_to_data_url(&bytes).with_context(invalid_image)?,
            description,
        ),
        None => {
            let describer = VisionDescriber::new(&registry, &CONFIG);
            let analysis = analyze_upload(&bytes, &describer)
                .await
                .with_context(invalid_image)?;
            (analysis.image_url, analysis.description)
        }
    };
    info!("Subject description: {}", description);

    if cli.prompts_only {
        for planned in reference_plan(Some(description.as_str())) {
            let (prompt, source) = synthesizer.synthesize_with_source(&planned.request).await;
            println!("[{}] {} ({})\n{}\n", planned.category, planned.label, source, prompt);
        }
        return Ok(());
    }

    let backend = Arc::new(Automatic1111Backend::from_config(&CONFIG));
    let generator = VariationGenerator::new(synthesizer, backend, CONFIG.images_per_variation);
    let set = build_reference_set(&generator, &image_url, Some(description.as_str())).await?;

    let output_dir = cli.output_dir.unwrap_or_else(|| CONFIG.output_dir.clone());
    let manifest_path = write_reference_set(&output_dir, &set, &cli.image_path, &description)?;
    info!(
        "Wrote {} image(s); manifest at {}",
        set.image_count(),
        manifest_path.display()
    );
    println!("{}", manifest_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG);

    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;
    info!("Starting character reference run for {}", cli.image_path.display());

    if let Err(err) = run(cli).await {
        error!("Reference run failed: {:#}", err);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use character_reference_studio::prompt::VariationType;

    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("character-reference")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_all_flags() {
        let cli = parse_args(&args(&[
            "face.jpg",
            "--output-dir",
            "out",
            "--description",
            "short blond hair",
            "--prompts-only",
        ]))
        .unwrap();
        assert_eq!(
            cli,
            CliArgs {
                image_path: PathBuf::from("face.jpg"),
                output_dir: Some(PathBuf::from("out")),
                description: Some("short blond hair".to_string()),
                prompts_only: true,
            }
        );
    }

    #[test]
    fn rejects_missing_values_and_unknown_flags() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["face.jpg", "--output-dir"])).is_err());
        assert!(parse_args(&args(&["face.jpg", "--seed", "4"])).is_err());
        assert!(parse_args(&args(&["a.jpg", "b.jpg"])).is_err());
    }

    #[test]
    fn writes_decoded_images_and_manifest() {
        let output_dir =
            std::env::temp_dir().join(format!("character-reference-{}", std::process::id()));
        let mut set = ReferenceSet::default();
        set.push(
            VariationType::Angle,
            "left45",
            "Left 45°",
            vec!["data:image/png;base64,SU1H".to_string(), "SU1H".to_string()],
        );
        set.push(
            VariationType::Angle,
            "back180",
            "Back 180°",
            vec!["SU1H".to_string()],
        );

        let manifest_path =
            write_reference_set(&output_dir, &set, Path::new("face.jpg"), "freckles").unwrap();

        assert_eq!(
            std::fs::read(output_dir.join("angle").join("left45_2.png")).unwrap(),
            b"IMG"
        );
        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
        assert_eq!(manifest["description"], "freckles");
        assert_eq!(manifest["files"].as_array().unwrap().len(), 3);
        assert_eq!(manifest["files"][0]["key"], "left45");
        assert_eq!(manifest["files"][2]["key"], "back180");

        std::fs::remove_dir_all(&output_dir).unwrap();
    }
}
