use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;
use vixen_editor::{EditSession, NodeId, Palette, TransactionListener, TransactionLog};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script of editing commands (JSON array)
    pub script: PathBuf,

    /// Document to start from; a fresh document is created when omitted
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Save the resulting document to a file (loadable with --input)
    /// instead of printing the tree to stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to vixen.config.json in the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// One step of an editing script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ScriptCommand {
    InsertButton,
    InsertTextField,
    InsertRadioGroup,
    Undo,
    Redo,

    /// Move the insertion point to an explicit node id and child index
    SetInsertionPoint { parent: NodeId, index: usize },

    /// Move the insertion point into the element whose `id` attribute
    /// matches, or into the root when `element` is omitted
    Select {
        #[serde(default)]
        element: Option<String>,
        #[serde(default)]
        index: usize,
    },

    /// Remove the element whose `id` attribute matches
    Remove { element: String },
}

pub fn run(args: RunArgs, cwd: &str) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(cwd)?,
    };
    let options = config.session_options();

    let mut session = match &args.input {
        Some(path) => EditSession::load("vixen", path, &options)
            .with_context(|| format!("Cannot load document {}", path.display()))?,
        None => EditSession::with_options("vixen", options),
    };
    let root = session.document().root();
    session.set_insertion_point(root, 0)?;

    let script = load_script(&args.script)?;
    eprintln!("{}", "🔧 Running editing script...".bright_blue().bold());

    let log = Rc::new(TransactionLog::new());
    let listener: Rc<dyn TransactionListener> = log.clone();
    let mut palette = Palette::with_listener(listener);

    for (step, command) in script.iter().enumerate() {
        let message = apply_command(&mut session, &mut palette, command)
            .with_context(|| format!("Step {} ({:?}) failed", step + 1, command))?;
        eprintln!("  {} {}", "✓".green(), message);
    }

    eprintln!(
        "{} commands, {} palette transactions, {} undo levels",
        script.len(),
        log.len(),
        session.manager().undo_levels()
    );

    match &args.output {
        Some(path) => {
            session
                .save_as(path)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            eprintln!("  {} Wrote {}", "✓".green(), path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&session.document().to_tree())?;
            println!("{json}");
        }
    }

    Ok(())
}

fn load_script(path: &Path) -> Result<Vec<ScriptCommand>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read script {}", path.display()))?;
    let script: Vec<ScriptCommand> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid script {}", path.display()))?;
    debug!(path = %path.display(), commands = script.len(), "Loaded script");
    Ok(script)
}

fn find_element(session: &EditSession, element: &str) -> Result<NodeId> {
    session
        .document()
        .find_by_attribute("id", element)
        .ok_or_else(|| anyhow!("No element with id \"{}\"", element))
}

/// Apply one script command, returning a status line
pub fn apply_command(
    session: &mut EditSession,
    palette: &mut Palette,
    command: &ScriptCommand,
) -> Result<String> {
    let message = match command {
        ScriptCommand::InsertButton => {
            let id = palette.insert_button(session)?;
            format!("insertButton → {id}")
        }
        ScriptCommand::InsertTextField => {
            let id = palette.insert_text_field(session)?;
            format!("insertTextField → {id}")
        }
        ScriptCommand::InsertRadioGroup => {
            let id = palette.insert_radio_group(session)?;
            format!("insertRadioGroup → {id}")
        }
        ScriptCommand::Undo => {
            if session.undo()? {
                "undo".to_string()
            } else {
                "undo (nothing to undo)".yellow().to_string()
            }
        }
        ScriptCommand::Redo => {
            if session.redo()? {
                "redo".to_string()
            } else {
                "redo (nothing to redo)".yellow().to_string()
            }
        }
        ScriptCommand::SetInsertionPoint { parent, index } => {
            session.set_insertion_point(*parent, *index)?;
            format!("setInsertionPoint {parent}[{index}]")
        }
        ScriptCommand::Select { element, index } => {
            let parent = match element {
                Some(element) => find_element(session, element)?,
                None => session.document().root(),
            };
            session.set_insertion_point(parent, *index)?;
            format!("select {parent}[{index}]")
        }
        ScriptCommand::Remove { element } => {
            let node = find_element(session, element)?;
            let transaction = session.remove_element(node);
            session.do_transaction(transaction)?;
            format!("remove {node}")
        }
    };
    Ok(message)
}
