use std::collections::HashMap;
use std::env;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lumen_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS, SUPPORTED_ASPECT_RATIOS};
use lumen_contracts::codec;
use lumen_contracts::events::EventWriter;
use lumen_contracts::image::ImageHandle;
use lumen_engine::{
    client_for_provider_with_lookup, FilterKind, RemoteEditClient, Session, SessionError,
    SessionOperation, SessionSlot, DEFAULT_ASPECT_RATIO,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(
    name = "lumen",
    version,
    about = "Iterative AI image generation and editing"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    reference: Vec<PathBuf>,
    #[arg(long, default_value = DEFAULT_ASPECT_RATIO)]
    aspect_ratio: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long)]
    model: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lumen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
    }
}

fn load_client(provider: &str, model: Option<&str>) -> Result<Box<dyn RemoteEditClient>> {
    let dotenv = env::current_dir()
        .ok()
        .and_then(|dir| find_dotenv(&dir))
        .map(|path| parse_dotenv(&path))
        .unwrap_or_default();
    client_for_provider_with_lookup(provider, model, |key| {
        env::var(key).ok().or_else(|| dotenv.get(key).cloned())
    })
}

fn run_chat(args: ChatArgs) -> Result<()> {
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let client = load_client(&args.provider, args.model.as_deref())?;
    let mut session = Session::with_events(client, EventWriter::for_new_session(events_path));

    println!(
        "Lumen chat started ({}). Type /help for commands.",
        session.client_name()
    );
    let stdin = io::stdin();
    chat_loop(&mut session, stdin.lock(), &args.out)
}

/// What the chat front end keeps between lines; the session owns the rest.
#[derive(Debug)]
struct ChatState {
    out_dir: PathBuf,
    aspect_ratio: String,
    references: Vec<ImageHandle>,
    written: usize,
}

impl ChatState {
    fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            references: Vec::new(),
            written: 0,
        }
    }

    /// Writes the image under a fresh name so earlier outputs stay viewable.
    fn write_image(&mut self, image: &ImageHandle) -> Result<PathBuf> {
        let path = output_path(&self.out_dir, self.written + 1, image.mime_type());
        codec::save_image_file(&path, image)?;
        self.written += 1;
        Ok(path)
    }
}

fn chat_loop(session: &mut Session, mut input: impl BufRead, out_dir: &Path) -> Result<()> {
    let mut state = ChatState::new(out_dir);
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let text = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(text);
        if intent.action == "noop" {
            continue;
        }

        match intent.action.as_str() {
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
                println!("Aspect ratios: {}", SUPPORTED_ASPECT_RATIOS.join(" "));
                println!("Filters: {}", filter_usage());
            }
            "set_aspect_ratio" => {
                let requested =
                    value_as_non_empty_string(intent.settings_update.get("aspect_ratio"));
                match requested {
                    None => println!("Aspect ratio: {}", state.aspect_ratio),
                    Some(ratio) if SUPPORTED_ASPECT_RATIOS.contains(&ratio.as_str()) => {
                        println!("Aspect ratio set to {ratio}");
                        state.aspect_ratio = ratio;
                    }
                    Some(ratio) => println!(
                        "Unsupported aspect ratio {ratio} (choose one of: {})",
                        SUPPORTED_ASPECT_RATIOS.join(", ")
                    ),
                }
            }
            "attach_references" => {
                let paths = value_as_string_list(intent.command_args.get("paths"));
                if paths.is_empty() {
                    println!("/attach requires one or more image paths");
                    continue;
                }
                match load_references(&paths) {
                    Ok(images) => {
                        println!("Attached {} reference image(s)", images.len());
                        state.references = images;
                    }
                    Err(err) => println!("Attach failed: {err:#}"),
                }
            }
            "detach_references" => {
                state.references.clear();
                println!("Reference images cleared");
            }
            "generate" => {
                let prompt = intent.prompt.unwrap_or_default();
                if let Some(seed) = session.take_edit_seed() {
                    state.references = vec![seed];
                }
                println!(
                    "{}",
                    SessionSlot::for_operation(SessionOperation::Generate).busy_label()
                );
                let result = session
                    .generate(&prompt, &state.references, &state.aspect_ratio)
                    .map(|snapshot| {
                        let reply = snapshot
                            .context()
                            .turns()
                            .last()
                            .map(|turn| {
                                turn.parts
                                    .iter()
                                    .filter_map(|part| part.as_text())
                                    .collect::<Vec<_>>()
                                    .join(" ")
                            })
                            .unwrap_or_default();
                        (snapshot.current_image().cloned(), reply)
                    });
                match result {
                    Ok((image, reply)) => {
                        if !reply.trim().is_empty() {
                            println!("{}", reply.trim());
                        }
                        report_current_image(&mut state, image.as_ref(), "Generated");
                    }
                    Err(err) => report_session_error(&err),
                }
            }
            "refine_with_ai" => match session.refine_with_ai() {
                Ok(_) => println!("Current image will be attached to your next prompt."),
                Err(err) => report_session_error(&err),
            },
            "adjust" => {
                let filters = intent
                    .command_args
                    .get("filters")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let invalid = value_as_string_list(intent.command_args.get("invalid"));
                if filters.is_empty() || !invalid.is_empty() {
                    println!("Usage: /adjust name=value ... ({})", filter_usage());
                    continue;
                }
                let mut editor = match session.adjust_locally() {
                    Ok(editor) => editor,
                    Err(err) => {
                        report_session_error(&err);
                        continue;
                    }
                };
                let assigned = filters.iter().try_for_each(|(name, value)| {
                    editor
                        .assign(name, value.as_str().unwrap_or_default())
                        .map(|_| ())
                });
                if let Err(err) = assigned {
                    println!("Adjustment cancelled: {err:#}");
                    continue;
                }
                let css = editor.params().css();
                let adjusted = match editor.commit() {
                    Ok(image) => image,
                    Err(err) => {
                        println!("Adjustment failed: {err:#}");
                        continue;
                    }
                };
                match session.save_adjusted(adjusted) {
                    Ok(snapshot) => {
                        let image = snapshot.current_image().cloned();
                        println!("Applied {css}");
                        report_current_image(&mut state, image.as_ref(), "Adjusted");
                    }
                    Err(err) => report_session_error(&err),
                }
            }
            "remove_background" => {
                println!(
                    "{}",
                    SessionSlot::for_operation(SessionOperation::RemoveBackground).busy_label()
                );
                match session.remove_background() {
                    Ok(snapshot) => {
                        let image = snapshot.current_image().cloned();
                        report_current_image(&mut state, image.as_ref(), "Background removed");
                    }
                    Err(err) => report_session_error(&err),
                }
            }
            "show_history" => {
                let snapshot = session.state();
                if snapshot.history().is_empty() {
                    println!("History is empty");
                    continue;
                }
                for (index, entry) in snapshot.history().entries().enumerate() {
                    let marker = if snapshot.current_image() == Some(&entry.image) {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{marker}[{index}] {} ({}, {} bytes)",
                        entry.prompt.trim(),
                        entry.origin.as_str(),
                        entry.image.len()
                    );
                }
            }
            "select_history" => {
                let Some(index) = intent
                    .command_args
                    .get("index")
                    .and_then(Value::as_u64)
                    .and_then(|value| usize::try_from(value).ok())
                else {
                    println!("/select requires a history index (see /history)");
                    continue;
                };
                match session.select_history_index(index) {
                    Ok(snapshot) => {
                        let image = snapshot.current_image().cloned();
                        report_current_image(&mut state, image.as_ref(), "Selected");
                    }
                    Err(err) => report_session_error(&err),
                }
            }
            "clear_history" => match session.clear_history() {
                Ok(_) => println!("History and conversation cleared"),
                Err(err) => report_session_error(&err),
            },
            "save_image" => {
                let Some(image) = session.state().current_image().cloned() else {
                    report_session_error(&SessionError::NoCurrentImage);
                    continue;
                };
                let path = value_as_non_empty_string(intent.command_args.get("path"))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        state.out_dir.join(format!(
                            "current.{}",
                            codec::extension_for_mime(image.mime_type())
                        ))
                    });
                match codec::save_image_file(&path, &image) {
                    Ok(()) => println!("Saved {}", path.display()),
                    Err(err) => println!("Save failed: {err:#}"),
                }
            }
            "status" => {
                let snapshot = session.state();
                println!("Provider: {}", session.client_name());
                println!("Aspect ratio: {}", state.aspect_ratio);
                println!("Reference images: {}", state.references.len());
                println!("History entries: {}", snapshot.history().len());
                println!("Conversation turns: {}", snapshot.context().len());
                match snapshot.current_image() {
                    Some(image) => {
                        println!("Current image: {} ({} bytes)", image.mime_type(), image.len())
                    }
                    None => println!("Current image: none"),
                }
                if snapshot.pending_edit_seed().is_some() {
                    println!("Next prompt will refine the current image");
                }
            }
            _ => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
        }

        for warning in session.take_warnings() {
            eprintln!("lumen warning: {warning}");
        }
    }

    for warning in session.take_warnings() {
        eprintln!("lumen warning: {warning}");
    }
    Ok(())
}

fn run_once(args: RunArgs) -> Result<i32> {
    let client = load_client(&args.provider, args.model.as_deref())?;
    let mut session = match args.events.clone() {
        Some(path) => Session::with_events(client, EventWriter::for_new_session(path)),
        None => Session::new(client),
    };
    let references = load_references(&args.reference)?;

    let outcome = session
        .generate(&args.prompt, &references, &args.aspect_ratio)
        .map(|snapshot| snapshot.current_image().cloned());
    for warning in session.take_warnings() {
        eprintln!("lumen warning: {warning}");
    }
    match outcome {
        Ok(Some(image)) => {
            codec::save_image_file(&args.out, &image)?;
            println!("Wrote {}", args.out.display());
            Ok(0)
        }
        Ok(None) => bail!("generation finished without a current image"),
        Err(err) => {
            report_session_error(&err);
            Ok(1)
        }
    }
}

fn load_references<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ImageHandle>> {
    paths
        .iter()
        .map(|path| codec::load_image_file(path.as_ref()))
        .collect()
}

/// Writes the new current image for viewing. A failed write is reported and
/// the chat carries on; the session already holds the image.
fn report_current_image(
    state: &mut ChatState,
    image: Option<&ImageHandle>,
    label: &str,
) -> Option<PathBuf> {
    let image = image?;
    match state.write_image(image) {
        Ok(path) => {
            println!("{label} -> {}", path.display());
            Some(path)
        }
        Err(err) => {
            println!("{label}, but the image could not be written: {err:#}");
            None
        }
    }
}

fn report_session_error(err: &SessionError) {
    println!("{}", err.user_message());
    if matches!(err, SessionError::Transport { .. }) {
        eprintln!("lumen error: {err}");
    }
}

fn output_path(out_dir: &Path, sequence: usize, mime_type: &str) -> PathBuf {
    out_dir.join(format!(
        "image-{sequence:03}.{}",
        codec::extension_for_mime(mime_type)
    ))
}

fn filter_usage() -> String {
    FilterKind::ALL
        .iter()
        .map(|kind| format!("{}=0..{}", kind.name(), kind.max()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_dotenv(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let unquoted = ['"', '\'']
            .iter()
            .find_map(|quote| {
                value
                    .strip_prefix(*quote)
                    .and_then(|rest| rest.strip_suffix(*quote))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), unquoted.to_string());
    }
    vars
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn value_as_string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
