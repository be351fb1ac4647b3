//! CLI interface for music2myears

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::feedback::{FeedbackEngine, NewFeedback, ReflectionOutcome};
use crate::fusion::{apply_overrides, ProfileFusion, SliderValues};
use crate::llm::{OpenRouterClient, TextGenerator};
use crate::session::GenerationSession;
use crate::types::{Dimension, GenerationParams, MoodRecord, PreferredVersion};

#[derive(Parser)]
#[command(name = "music2myears")]
#[command(about = "Learns from listener feedback to write better music prompts", long_about = None)]
#[command(version)]
struct Cli {
    /// Use a different config file
    #[arg(short, long, env = "MUSIC2MYEARS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record feedback for a generation
    Submit {
        /// Feedback JSON file
        #[arg(short, long, conflicts_with = "session")]
        file: Option<PathBuf>,
        /// Session JSON written by `prompt --out`
        #[arg(short, long, requires = "rating")]
        session: Option<PathBuf>,
        /// Rating 1-5 (with --session)
        #[arg(short, long)]
        rating: Option<u8>,
        /// Listener would play it again (with --session)
        #[arg(long)]
        replay: bool,
        /// Free-form note (with --session)
        #[arg(short, long)]
        note: Option<String>,
        /// Preferred A/B version: A, B, "No preference" (with --session)
        #[arg(long)]
        preferred: Option<String>,
    },
    /// Show feedback statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show learned rules
    Rules {
        /// Only show the profile for this emotion
        #[arg(short, long)]
        emotion: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show few-shot prompt examples for an emotion
    Examples {
        emotion: String,
        /// Number of examples
        #[arg(short, long)]
        k: Option<usize>,
        /// Show the worst-rated prompts instead
        #[arg(long)]
        bottom: bool,
    },
    /// Show learned slider defaults for an emotion
    Defaults {
        emotion: String,
    },
    /// Run a reflection pass now
    Reflect,
    /// Fuse mood records and write a music prompt
    Prompt {
        /// JSON file with an array of mood records
        #[arg(short, long)]
        moods: PathBuf,
        #[arg(long)]
        energy: Option<u8>,
        #[arg(long)]
        style: Option<u8>,
        #[arg(long)]
        warmth: Option<u8>,
        #[arg(long)]
        arc: Option<u8>,
        /// Save the session for a later `submit --session`
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Configure music2myears
    Config {
        /// Set OpenRouter API key
        #[arg(long)]
        set_api_key: Option<String>,
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Submit { file, session, rating, replay, note, preferred } => {
            let feedback = match (file, session) {
                (Some(path), _) => read_json::<NewFeedback>(&path)?,
                (None, Some(path)) => {
                    let mut session = read_json::<GenerationSession>(&path)?;
                    if let Some(preferred) = preferred {
                        session.preferred_version = parse_preferred(&preferred)?;
                    }
                    let rating = rating.context("--rating is required with --session")?;
                    session.into_feedback(rating, replay, note)
                }
                (None, None) => bail!("Provide --file or --session"),
            };
            submit_feedback(&config, feedback).await?;
        }
        Commands::Stats { json } => {
            show_stats(&config, json).await?;
        }
        Commands::Rules { emotion, json } => {
            show_rules(&config, emotion.as_deref(), json).await?;
        }
        Commands::Examples { emotion, k, bottom } => {
            let engine = open_engine(&config).await?;
            let k = k.unwrap_or(config.retrieval.examples);
            let examples = if bottom {
                engine.bottom_examples(&emotion, k).await?
            } else {
                engine.top_examples(&emotion, k).await?
            };
            if examples.is_empty() {
                println!("No feedback recorded for '{}' yet.", emotion);
            }
            for (i, prompt) in examples.iter().enumerate() {
                println!("{}. {}", i + 1, prompt);
            }
        }
        Commands::Defaults { emotion } => {
            let engine = open_engine(&config).await?;
            let defaults = engine.blended_defaults(&emotion).await;
            if defaults.is_empty() {
                println!("No learned defaults for '{}' yet.", emotion);
            }
            for (dimension, value) in &defaults {
                println!("  {:<8} {}", dimension.as_str(), value);
            }
        }
        Commands::Reflect => {
            let engine = open_engine(&config).await?;
            print_reflection(&engine.reflect_now().await);
        }
        Commands::Prompt { moods, energy, style, warmth, arc, out } => {
            let sliders: SliderValues = [
                (Dimension::Energy, energy),
                (Dimension::Style, style),
                (Dimension::Warmth, warmth),
                (Dimension::Arc, arc),
            ]
            .into_iter()
            .filter_map(|(dimension, value)| value.map(|v| (dimension, v)))
            .collect();
            write_prompt(&config, &moods, &sliders, out.as_deref()).await?;
        }
        Commands::Config { set_api_key, show } => {
            if let Some(key) = set_api_key {
                crate::secrets::set_api_key(&key)?;
                println!("OpenRouter API key stored.");
            } else if show {
                println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
                println!("Config file: {}", crate::config::config_path()?.display());
                println!("Database:    {}", config.storage.resolve_database_path()?.display());
            } else {
                println!("Configuration options:");
                println!("  --set-api-key <key>      Set your OpenRouter API key");
                println!("  --show                   Display current configuration");
            }
        }
    }

    Ok(())
}

/// Generator that reports the missing key instead of failing engine startup
struct MissingKey(String);

#[async_trait::async_trait]
impl TextGenerator for MissingKey {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("{}", self.0)
    }
}

fn generator(model: &str) -> Arc<dyn TextGenerator> {
    match OpenRouterClient::from_keyring(model) {
        Ok(client) => Arc::new(client),
        Err(e) => Arc::new(MissingKey(e.to_string())),
    }
}

async fn open_engine(config: &Config) -> Result<FeedbackEngine> {
    let path = config.storage.resolve_database_path()?;
    let engine = FeedbackEngine::open(&path, &config.reflection, generator(&config.reflection.model))
        .await
        .with_context(|| format!("Failed to open feedback database {}", path.display()))?;
    Ok(engine)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_preferred(value: &str) -> Result<PreferredVersion> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("Unknown preferred version '{}'", value))
}

async fn submit_feedback(config: &Config, feedback: NewFeedback) -> Result<()> {
    let engine = open_engine(config).await?;
    let outcome = engine.submit(feedback).await?;
    println!("Feedback #{} recorded.", outcome.id);
    print_reflection(&outcome.reflection);
    Ok(())
}

fn print_reflection(outcome: &ReflectionOutcome) {
    match outcome {
        ReflectionOutcome::NotDue { remaining } => {
            println!("Next reflection in {} submission(s).", remaining);
        }
        ReflectionOutcome::Completed { reflections_completed, entries_analyzed, emotions_learned } => {
            println!(
                "✅ Reflection #{} analyzed {} sessions.",
                reflections_completed, entries_analyzed
            );
            if !emotions_learned.is_empty() {
                println!("   Emotions learned: {}", emotions_learned.join(", "));
            }
        }
        ReflectionOutcome::Failed { reason } => {
            println!("⚠️  Reflection failed, previous rules kept: {}", reason);
        }
    }
}

async fn show_stats(config: &Config, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let summary = engine.summarize().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n📊 Feedback Statistics");
    println!("═══════════════════════════════════════");
    println!("  Sessions rated:        {}", summary.total_sessions);
    println!("  Average rating:        {:.1}", summary.average_rating);
    println!("  Replay rate:           {}%", summary.replay_rate_percent);
    println!("  Reflections:           {}", summary.reflections_completed);
    println!("  Emotion profiles:      {}", summary.rules_active_count);
    println!("  Next reflection in:    {}", summary.next_reflection_in);
    if !summary.emotions_learned.is_empty() {
        println!("  Emotions learned:      {}", summary.emotions_learned.join(", "));
    }
    Ok(())
}

async fn show_rules(config: &Config, emotion: Option<&str>, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;

    if let Some(emotion) = emotion {
        let profile = engine.profile_for(emotion).await
            .with_context(|| format!("No learned profile for '{}'", emotion))?;
        if json {
            println!("{}", serde_json::to_string_pretty(&profile)?);
        } else {
            println!("\n🎵 {} ({} sessions)", profile.emotion, profile.sample_size);
            for (dimension, value) in &profile.defaults {
                println!("  {:<8} {}", dimension.as_str(), value);
            }
            print_list("Principles", &profile.prompt_principles);
            print_list("Anti-patterns", &profile.anti_patterns);
        }
        return Ok(());
    }

    let rules = engine.current_rules().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&*rules)?);
        return Ok(());
    }

    println!(
        "\nBased on {} reflection(s) analyzing {} sessions",
        rules.reflection_count(),
        rules.entries_analyzed()
    );
    print_list("Global rules", &rules.global_rules.positive);
    print_list("Avoid", &rules.global_rules.negative);
    for (emotion, profile) in &rules.emotion_profiles {
        println!("\n  {}: {} principles, {} anti-patterns", emotion, profile.prompt_principles.len(), profile.anti_patterns.len());
    }
    Ok(())
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for item in items {
        println!("  - {}", item);
    }
}

async fn write_prompt(config: &Config, moods_path: &Path, sliders: &SliderValues, out: Option<&Path>) -> Result<()> {
    let moods: Vec<MoodRecord> = read_json(moods_path)?;
    let engine = open_engine(config).await?;
    let director = generator(&config.openrouter.default_model);

    let ai_profile = ProfileFusion::new(director.clone()).fuse(&engine, &moods).await?;
    let final_profile = apply_overrides(&ai_profile, sliders);
    let music_prompt = crate::prompt::create_music_prompt(director.as_ref(), &engine, &final_profile).await?;

    println!(
        "AI profile:    {} (energy {}, style {}, warmth {}, arc {})",
        ai_profile.emotion, ai_profile.energy, ai_profile.style, ai_profile.warmth, ai_profile.arc
    );
    if !final_profile.overrides.is_empty() {
        let adjusted: Vec<&str> = final_profile.overrides.iter().map(|d| d.as_str()).collect();
        println!("You adjusted:  {}", adjusted.join(", "));
    }
    println!("\n{}", music_prompt);

    if let Some(out) = out {
        let session = GenerationSession {
            moods,
            ai_profile,
            final_profile,
            music_prompt,
            gen_params: GenerationParams::default(),
            preferred_version: PreferredVersion::default(),
        };
        std::fs::write(out, serde_json::to_string_pretty(&session)?)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!("\nSession saved to {}", out.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_submit_session() {
        let cli = Cli::try_parse_from([
            "music2myears", "submit", "--session", "s.json", "--rating", "4", "--replay",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit { session, rating, replay, .. } => {
                assert_eq!(session, Some(PathBuf::from("s.json")));
                assert_eq!(rating, Some(4));
                assert!(replay);
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_cli_rejects_file_and_session() {
        assert!(Cli::try_parse_from([
            "music2myears", "submit", "--file", "f.json", "--session", "s.json", "--rating", "3",
        ])
        .is_err());
    }

    #[test]
    fn test_parse_preferred() {
        assert_eq!(parse_preferred("B").unwrap(), PreferredVersion::B);
        assert_eq!(parse_preferred("No preference").unwrap(), PreferredVersion::NoPreference);
        assert!(parse_preferred("C").is_err());
    }

    #[tokio::test]
    async fn test_missing_key_generator_errors() {
        let generator = MissingKey("no key".to_string());
        let err = generator.generate("hi").await.unwrap_err();
        assert_eq!(err.to_string(), "no key");
    }
}
