mod clues;
mod config;
mod confidence;
mod enhance;
mod error;
mod fuzzy;
mod history;
mod ingest;
mod miner;
mod model;
mod notes;
mod store;
mod suggest;

use std::path::Path;

use tracing::info;

use crate::config::Config;
use crate::history::HistoryStore;
use crate::miner::HistoricalMiner;
use crate::model::ContextType;
use crate::notes::{NoteLearner, SupplierResolver};
use crate::store::PatternStore;
use crate::suggest::{ItemInput, SuggestionEngine};

const CONFIG_PATH: &str = "invoice_learning.toml";

const USAGE: &str = "Usage:
  invoice_learning mine
  invoice_learning suggest <supplier> <item-or-text> [project] [amount]
  invoice_learning note <supplier> <context> <linked-field> <document> <text...>
  invoice_learning similar <context> <text...>
  invoice_learning ingest <ocr-text-file>
  invoice_learning stats";

/// Resolver for the CLI path, where the note creation already knows
/// which supplier the document belongs to.
struct CliResolver {
    document: String,
    supplier: String,
}

impl SupplierResolver for CliResolver {
    fn resolve_supplier(&self, document_id: &str) -> Option<String> {
        (document_id == self.document).then(|| self.supplier.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let cfg = if Path::new(CONFIG_PATH).exists() {
        Config::load(CONFIG_PATH)?
    } else {
        Config::default()
    };

    if let Some(parent) = Path::new(&cfg.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = Path::new(&cfg.history_db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    match command {
        "mine" => {
            let history = HistoryStore::new(&cfg.history_db_path)?;
            let mut store = PatternStore::new(&cfg.db_path)?;
            let summary = HistoricalMiner::new(&cfg.learning).mine(&history, &mut store)?;
            info!(patterns = summary.total(), "Mining finished");
        }
        "suggest" => {
            let [supplier, item, rest @ ..] = &args[1..] else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            let project = rest.first().map(String::as_str);
            let amount = rest.get(1).map(|a| a.parse::<f64>()).transpose()?;

            let store = PatternStore::new(&cfg.db_path)?;
            let engine = SuggestionEngine::new(&cfg.learning);
            let item_input = ItemInput::infer(&store, supplier, item)?;
            let suggestions = engine.suggest(&store, supplier, item_input, project, amount)?;
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
        }
        "note" => {
            let [supplier, context, linked_field, document, text @ ..] = &args[1..] else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            let context_type = ContextType::parse(context)
                .ok_or_else(|| format!("unknown context type: {context}"))?;
            let text = text.join(" ");

            let note = model::ManualNote {
                id: PatternStore::generate_note_id(&text, context_type, document),
                text,
                context_type,
                linked_field: Some(linked_field.clone()),
                source_document: Some(document.clone()),
                confidence_impact: 0,
                times_referenced: 0,
                pattern_similarity_score: None,
                applied_to_learning: false,
                created_by: None,
                created_at: None,
            };

            let mut store = PatternStore::new(&cfg.db_path)?;
            store.insert_note(&note)?;

            let resolver = CliResolver {
                document: document.clone(),
                supplier: supplier.clone(),
            };
            let outcome = NoteLearner::new(&cfg.learning).apply(&mut store, &note.id, &resolver)?;
            info!(note_id = %note.id, ?outcome, "Note processed");
        }
        "similar" => {
            let [context, text @ ..] = &args[1..] else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            let context_type = ContextType::parse(context)
                .ok_or_else(|| format!("unknown context type: {context}"))?;
            let text = text.join(" ");

            let store = PatternStore::new(&cfg.db_path)?;
            let learner = NoteLearner::new(&cfg.learning);
            for similar in learner.similar_patterns(&store, &text, context_type, "")? {
                println!(
                    "{}%  {}  {}",
                    similar.similarity,
                    similar.linked_field.as_deref().unwrap_or("-"),
                    similar.note_id
                );
            }
        }
        "ingest" => {
            let [path] = &args[1..] else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            let text = std::fs::read_to_string(path)?;
            let invoice = enhance::enhance_extraction(&text, &cfg.llm).await;
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
        "stats" => {
            let store = PatternStore::new(&cfg.db_path)?;
            let counts = store.counts()?;
            info!(
                bindings = counts.bindings,
                patterns = counts.patterns,
                notes = counts.notes,
                applied_notes = counts.applied_notes,
                "Pattern store statistics"
            );
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
