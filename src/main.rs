//! Daily Verse command line

use anyhow::{bail, Context, Result};
use daily_verse_lib::{get_data_dir, AppState, LanguageEvent, VerseConfig, VerseRecord};
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: daily-verse [--lang CODE] \
[random | category NAME | reference REF | search QUERY | categories | categories-in-use | \
clear-cache | offline]";

enum Command {
    Random,
    Category(String),
    Reference(String),
    Search(String),
    Categories,
    CategoriesInUse,
    ClearCache,
    Offline,
}

struct Args {
    language: Option<String>,
    command: Command,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args> {
    let mut language = None;
    let mut words = Vec::new();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--lang" | "-l" => {
                language = Some(raw.next().context("--lang needs a language code")?);
            }
            "--help" | "-h" => bail!(USAGE),
            _ => words.push(arg),
        }
    }

    let (name, rest) = match words.split_first() {
        Some((name, rest)) => (name.as_str(), rest.join(" ")),
        None => ("random", String::new()),
    };
    let needs_value = |value: String| -> Result<String> {
        if value.trim().is_empty() {
            bail!("'{}' needs an argument\n{}", name, USAGE);
        }
        Ok(value)
    };
    let command = match name {
        "random" => Command::Random,
        "category" => Command::Category(needs_value(rest)?),
        "reference" => Command::Reference(needs_value(rest)?),
        "search" => Command::Search(needs_value(rest)?),
        "categories" => Command::Categories,
        "categories-in-use" => Command::CategoriesInUse,
        "clear-cache" => Command::ClearCache,
        "offline" => Command::Offline,
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    };
    Ok(Args { language, command })
}

fn load_config() -> Result<VerseConfig> {
    let path = get_data_dir().join("config.json");
    if path.exists() {
        VerseConfig::load(&path)
    } else {
        Ok(VerseConfig::default())
    }
}

fn show(state: &AppState, verse: &VerseRecord) {
    println!("{}\n    {}", verse.text, verse.reference);
    state.recent.add(verse);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = load_config()?;
    tracing::info!("Using data directory: {:?}", config.data_dir);

    let state = AppState::new(config).context("Failed to initialize application state")?;
    let mut events = state.subscribe();

    if let Err(e) = state.refresh_languages().await {
        tracing::warn!("Continuing with the last known languages: {}", e);
    }
    if let Some(code) = &args.language {
        state.set_language(code);
    }

    let language = state.repository.language();
    let repository = &state.repository;
    match args.command {
        Command::Random => match repository.get_random_verse(Some(&language)).await? {
            Some(verse) => show(&state, &verse),
            None => println!("No verses available"),
        },
        Command::Category(name) => {
            match repository.select_by_category(&name, Some(&language)).await? {
                Some(selection) => {
                    if selection.fell_back {
                        eprintln!("No verses in '{}'; showing a random verse", name);
                    }
                    show(&state, &selection.verse);
                }
                None => println!("No verses available"),
            }
        }
        Command::Reference(reference) => {
            match repository
                .get_verse_by_reference(&reference, Some(&language))
                .await?
            {
                Some(verse) => show(&state, &verse),
                None => println!("No verse matches '{}'", reference),
            }
        }
        Command::Search(query) => {
            let results = repository.search_verses(&query, Some(&language)).await?;
            if results.is_empty() {
                println!("No results for '{}'", query);
            }
            for verse in &results {
                println!("{}: {}", verse.reference, verse.text);
            }
        }
        Command::Categories => {
            for category in repository.get_categories() {
                println!("{}", category);
            }
        }
        Command::CategoriesInUse => {
            for category in repository.categories_in_use(Some(&language)).await? {
                println!("{}", category);
            }
        }
        Command::ClearCache => {
            state.clear_cache();
            println!("Cache cleared");
        }
        Command::Offline => {
            let report = state.prepare_offline().await;
            println!("Ready: {}", report.ready.join(", "));
            if !report.failed.is_empty() {
                println!("Failed: {}", report.failed.join(", "));
            }
        }
    }

    loop {
        match events.try_recv() {
            Ok(LanguageEvent::Disabled { code }) => {
                eprintln!("Language '{}' is unavailable and has been disabled", code)
            }
            Ok(LanguageEvent::Changed { .. }) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_category_listings_are_distinct_commands() {
        assert!(matches!(parse(&["categories"]).unwrap().command, Command::Categories));
        assert!(matches!(
            parse(&["categories-in-use"]).unwrap().command,
            Command::CategoriesInUse
        ));
    }

    #[test]
    fn test_language_flag_and_multiword_arguments() {
        let args = parse(&["--lang", "es", "search", "buen", "pastor"]).unwrap();
        assert_eq!(args.language.as_deref(), Some("es"));
        assert!(matches!(args.command, Command::Search(ref q) if q == "buen pastor"));

        assert!(matches!(parse(&[]).unwrap().command, Command::Random));
        assert!(parse(&["category"]).is_err());
        assert!(parse(&["--lang"]).is_err());
        assert!(parse(&["bogus"]).is_err());
    }
}
