use articlecraft::cli::{Cli, Commands, ConfigAction};
use articlecraft::config::{expand_path, Config};
use articlecraft::corpus::{read_corpus, ArticleStore};
use articlecraft::embedding::provider_for_model;
use articlecraft::error::{ArticleCraftError, Result};
use articlecraft::generation::{article_file_name, save_article};
use articlecraft::recommend::Recommendation;
use articlecraft::sampler::{RepresentativeSampler, SamplerSettings};
use articlecraft::server::QueryServer;
use articlecraft::service::{ArticleServices, Availability};
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "articlecraft=debug"
    } else {
        "articlecraft=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        profile,
        command,
        ..
    } = cli;

    match command {
        Commands::Build {
            input,
            skip_reference,
        } => cmd_build(load_config(config_path, profile)?, input, skip_reference),
        Commands::Recommend { query, top_k, json } => {
            let services = initialized(load_config(config_path, profile)?);
            print_recommendations(&services.recommend(&query, top_k)?, json)
        }
        Commands::Similar { title, top_k, json } => {
            let services = initialized(load_config(config_path, profile)?);
            print_recommendations(&services.recommend_by_existing_title(&title, top_k)?, json)
        }
        Commands::Generate {
            title,
            num_similar,
            output,
        } => cmd_generate(load_config(config_path, profile)?, &title, num_similar, output),
        Commands::Sample {
            input,
            output,
            chunk_size,
            clusters,
            per_cluster,
        } => {
            let mut config = load_config(config_path, profile)?;
            if let Some(chunk_size) = chunk_size {
                config.sampler.chunk_size = chunk_size;
            }
            if let Some(clusters) = clusters {
                config.sampler.n_clusters = clusters;
            }
            if let Some(per_cluster) = per_cluster {
                config.sampler.n_per_cluster = per_cluster;
            }
            cmd_sample(config, input, output)
        }
        Commands::Import { input } => cmd_import(load_config(config_path, profile)?, &input),
        Commands::Status { json } => cmd_status(load_config(config_path, profile)?, json),
        Commands::Serve => cmd_serve(load_config(config_path, profile)?),
        Commands::Config { action } => cmd_config(config_path, profile, action),
    }
}

fn initialized(config: Config) -> ArticleServices {
    let services = ArticleServices::new(config);
    services.initialize();
    services
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ArticleCraftError::io(e, "Failed to create tokio runtime"))
}

fn cmd_build(config: Config, input: Option<PathBuf>, skip_reference: bool) -> Result<()> {
    let services = ArticleServices::new(config);
    let entries = match input {
        Some(path) => read_corpus(&path)?,
        None => services.load_corpus()?,
    };
    println!("Building indexes over {} articles...", entries.len());

    if skip_reference {
        let recommender = services.build_index(entries)?;
        println!("✓ Recommendation index built: {} articles", recommender.len());
    } else {
        let availability = services.rebuild(entries)?;
        println!(
            "✓ Recommendation index built: {} articles",
            availability.articles
        );
        println!(
            "✓ Reference index built: {} segments",
            availability.reference_segments
        );
    }
    Ok(())
}

fn print_recommendations(recommendations: &[Recommendation], json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(recommendations)
            .map_err(|e| ArticleCraftError::json(e, "Failed to serialize recommendations"))?;
        println!("{}", out);
        return Ok(());
    }

    if recommendations.is_empty() {
        println!("No recommendations");
        return Ok(());
    }

    for (rank, rec) in recommendations.iter().enumerate() {
        println!("{:>2}. {} ({:.3})", rank + 1, rec.title, rec.similarity);
        if let Some(url) = &rec.url {
            println!("    {}", url);
        }
        let preview: String = rec.text.chars().take(160).collect();
        println!("    {}", preview);
    }
    Ok(())
}

fn cmd_generate(
    config: Config,
    title: &str,
    num_similar: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let services = initialized(config);
    let article = runtime()?.block_on(services.generate_article(title, num_similar))?;

    if article.fallback_used {
        println!("⚠ Completion backend failed; showing the nearest reference segment");
    }
    println!("# {}\n\n{}", article.title, article.content);
    println!();
    println!("References: {}", article.reference_titles.join(", "));
    println!("Generated in {:.2}s", article.elapsed_seconds);

    if let Some(output) = output {
        let path = if output.is_dir() {
            output.join(article_file_name(&article.title))
        } else {
            output
        };
        save_article(&article.title, &article.content, &path)?;
        println!("✓ Article saved to {}", path.display());
    }
    Ok(())
}

fn cmd_sample(config: Config, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input = expand_path(&input.unwrap_or_else(|| config.storage.corpus_file.clone()))?;
    let output = expand_path(&output.unwrap_or_else(|| config.sampler.output_dir.clone()))?;

    let provider = provider_for_model(&config.embedding.model)?;
    let sampler = RepresentativeSampler::new(SamplerSettings::from(&config.sampler), provider)?;
    let report = sampler.sample_file(&input, &output)?;

    println!(
        "✓ Kept {} of {} articles from {} chunks ({} skipped) in {:.1}s",
        report.rows_kept,
        report.rows_seen,
        report.chunks_processed,
        report.chunks_skipped,
        report.duration_secs
    );
    println!("  Output: {}", output.display());
    Ok(())
}

fn cmd_import(config: Config, input: &std::path::Path) -> Result<()> {
    let entries = read_corpus(input)?;
    let store = ArticleStore::open(&expand_path(&config.storage.database_file)?)?;
    let imported = store.upsert(&entries)?;
    println!(
        "✓ Imported {} articles ({} in store)",
        imported,
        store.count()?
    );
    Ok(())
}

fn cmd_status(config: Config, json: bool) -> Result<()> {
    let availability = initialized(config).availability();

    if json {
        let out = serde_json::to_string_pretty(&availability)
            .map_err(|e| ArticleCraftError::json(e, "Failed to serialize status"))?;
        println!("{}", out);
        return Ok(());
    }

    print_availability(&availability);
    Ok(())
}

fn print_availability(availability: &Availability) {
    println!("ArticleCraft Status");
    println!("===================");
    if availability.recommender {
        println!("\nRecommendations: available ({} articles)", availability.articles);
    } else {
        println!("\nRecommendations: unavailable");
        if let Some(error) = &availability.recommender_error {
            println!("  {}", error);
        }
    }
    if availability.generator {
        println!(
            "Generation: available ({} reference segments)",
            availability.reference_segments
        );
    } else {
        println!("Generation: unavailable");
        if let Some(error) = &availability.generator_error {
            println!("  {}", error);
        }
    }
}

fn cmd_serve(config: Config) -> Result<()> {
    let socket_path = expand_path(&config.server.socket_path)?;
    let max_connections = config.server.max_connections;

    let services = Arc::new(ArticleServices::new(config));
    print_availability(&services.initialize());
    println!("\n✓ Serving on {}", socket_path.display());

    runtime()?.block_on(QueryServer::new(services, socket_path, max_connections).run())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config)
                .map_err(|e| ArticleCraftError::json(e, "Failed to serialize config"))?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    ArticleCraftError::InvalidConfigValue {
                        path: section.clone(),
                        message: "no such section".to_string(),
                    }
                })?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&shown)
                .map_err(|e| ArticleCraftError::json(e, "Failed to serialize config"))?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ArticleCraftError::io(
                        e,
                        format!("Failed to create config directory: {:?}", parent),
                    )
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'articlecraft config init' to create one."
        );
        return Ok(Config::default());
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
