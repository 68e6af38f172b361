use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use editai_contracts::chat::{parse_intent, ChatEntry, Intent, CHAT_HELP_COMMANDS, SUGGESTED_TOPICS};
use editai_contracts::events::EventWriter;
use editai_contracts::options::{Mode, OptionField};
use editai_contracts::uploads::{UploadSlot, UploadedAsset};
use editai_engine::{ClientConfig, Engine, MaskEditor, MaskScript, SubmitOutcome};
use log::info;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "editai", version, about = "Chat front end for an image generation API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat session.
    Chat(ChatArgs),
    /// Send a single request and save the results.
    Submit(SubmitArgs),
    /// Paint a mask from a stroke script without calling the API.
    Mask(MaskArgs),
}

#[derive(Debug, Parser)]
struct ClientArgs {
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    client: ClientArgs,
    /// Directory for /download when no path is given.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct SubmitArgs {
    #[command(flatten)]
    client: ClientArgs,
    #[arg(long, default_value = "generate")]
    mode: String,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    mask: Option<PathBuf>,
    /// Stroke script painted onto a mask for the edit image.
    #[arg(long)]
    mask_script: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    n: Option<u32>,
    #[arg(long)]
    size: Option<String>,
    /// Extra option as `field=value`; repeatable.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    set: Vec<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct MaskArgs {
    #[arg(long)]
    source: PathBuf,
    #[arg(long)]
    script: PathBuf,
    #[arg(long)]
    out: PathBuf,
    /// Write the canvas as drawn instead of the API mask.
    #[arg(long)]
    overlay: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("editai error: {err:#}");
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
        Command::Submit(args) => run_submit(args),
        Command::Mask(args) => run_mask(args),
    }
}

fn client_config(args: &ClientArgs) -> ClientConfig {
    let mut config = ClientConfig::from_env();
    if let Some(api_base) = args.api_base.as_deref() {
        config = config.with_api_base(api_base);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout_secs(secs);
    }
    if args.dryrun {
        config.dryrun = true;
    }
    config
}

fn build_engine(args: &ClientArgs) -> Result<Engine> {
    let config = client_config(args);
    info!(
        "api base {} (dryrun: {}, timeout {:?})",
        config.api_base, config.dryrun, config.timeout
    );
    Engine::from_config(&config, EventWriter::with_new_session(args.events.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut engine = build_engine(&args.client)?;
    let stdin = io::stdin();
    let mut line = String::new();

    println!(
        "EditAI chat started ({} transport, {} mode). Type /help for commands.",
        engine.transport_name(),
        engine.state().mode()
    );
    print_topics();

    loop {
        print!("{}> ", engine.state().mode());
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match dispatch(&mut engine, &intent, &args.out) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) => println!("Error: {err:#}"),
        }
    }
    Ok(())
}

fn dispatch(engine: &mut Engine, intent: &Intent, download_dir: &Path) -> Result<Flow> {
    let args = &intent.command_args;
    match intent.action.as_str() {
        "noop" => {}
        "quit" => return Ok(Flow::Quit),
        "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join("  ")),
        "set_mode" => {
            let mode: Mode = value_as_non_empty_string(args.get("mode"))
                .unwrap_or_default()
                .parse()
                .map_err(anyhow::Error::msg)?;
            engine.change_mode(mode)?;
            println!("Mode set to {mode}; options and uploads reset.");
        }
        "set_model" => {
            let Some(model) = value_as_non_empty_string(args.get("model")) else {
                bail!("/model requires a model name");
            };
            set_option(engine, OptionField::Model, &model)?;
        }
        "set_option" => {
            let field: OptionField = value_as_non_empty_string(args.get("field"))
                .unwrap_or_default()
                .parse()
                .map_err(anyhow::Error::msg)?;
            let value = args
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            set_option(engine, field, &value)?;
        }
        "show_options" => print_options(engine),
        "models" => print_models(engine),
        "topics" => print_topics(),
        "use_topic" => {
            let Some(number) = value_as_non_empty_string(args.get("index"))
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|number| *number > 0)
            else {
                bail!("/topic requires a number from 1 to {}", SUGGESTED_TOPICS.len());
            };
            let prompt = engine.use_topic(number - 1)?;
            println!("Prompt set: {prompt}");
            println!("Type /submit to send it, or type a new prompt.");
        }
        "attach_image" | "attach_mask" => {
            let slot = if intent.action == "attach_image" {
                UploadSlot::Image
            } else {
                UploadSlot::Mask
            };
            let Some(path) = value_as_non_empty_string(args.get("path")) else {
                bail!("/{} requires a path", slot.as_str());
            };
            engine.attach_path(slot, Path::new(&path))?;
            println!("Attached {path} as {}.", slot.as_str());
        }
        "draw_mask" => {
            let Some(path) = value_as_non_empty_string(args.get("path")) else {
                bail!("/draw requires a stroke script path");
            };
            let script = MaskScript::from_path(Path::new(&path))?;
            let editor = engine.draw_mask(&script)?;
            let (width, height) = editor.dimensions();
            println!(
                "Mask {width}x{height} attached ({} strokes, {} painted pixels).",
                editor.stroke_count(),
                editor.painted_pixels()
            );
        }
        "save_mask" => {
            let Some(path) = value_as_non_empty_string(args.get("path")) else {
                bail!("/save_mask requires a path");
            };
            let saved = engine.save_mask(Path::new(&path), false)?;
            println!("Mask saved to {}", saved.display());
        }
        "prompt" => {
            if !engine.state().mode().requires_prompt() {
                println!("Variation mode takes no prompt; attach a square PNG with /image and use /submit.");
                return Ok(Flow::Continue);
            }
            engine.set_prompt(intent.prompt.as_deref().unwrap_or_default())?;
            report_submission(engine, |engine| engine.submit());
        }
        "submit" => report_submission(engine, |engine| engine.submit()),
        "regenerate" => {
            let entry = require_index(args.get("entry"), "/regenerate <entry>")?;
            report_submission(engine, |engine| engine.regenerate(entry));
        }
        "expand" => {
            let entry = require_index(args.get("entry"), "/expand <entry> [image]")?;
            let image = index_arg(args.get("image")).unwrap_or(0);
            let source = engine.expand(entry, image)?;
            if source.is_inline() {
                println!("[{entry}.{image}] {} (use /download to save it)", source.summary());
            } else {
                println!("[{entry}.{image}] {source}");
            }
        }
        "close_expanded" => {
            engine.close_expanded()?;
        }
        "download" => {
            let entry = require_index(args.get("entry"), "/download <entry> [image] [path]")?;
            let image = index_arg(args.get("image")).unwrap_or(0);
            let dest = value_as_non_empty_string(args.get("path"))
                .map(PathBuf::from)
                .unwrap_or_else(|| download_dir.to_path_buf());
            let path = engine.download(entry, image, Some(&dest))?;
            println!("Saved {}", path.display());
        }
        "history" => {
            if engine.state().chat().is_empty() {
                println!("No messages yet.");
            }
            for (index, entry) in engine.state().chat().entries().iter().enumerate() {
                print_entry(index, entry);
            }
        }
        "unknown" => {
            let command = value_as_non_empty_string(args.get("command")).unwrap_or_default();
            println!("Unknown command /{command}. Type /help for commands.");
        }
        other => println!("Unhandled action {other}."),
    }
    Ok(Flow::Continue)
}

fn set_option(engine: &mut Engine, field: OptionField, value: &str) -> Result<()> {
    let note = engine.set_option(field, value)?;
    println!("{field} = {}", value_text(&engine.state().options().get(field)));
    if let Some(note) = note {
        println!("Note: {note}");
    }
    Ok(())
}

fn report_submission(
    engine: &mut Engine,
    submit: impl FnOnce(&mut Engine) -> std::result::Result<SubmitOutcome, editai_engine::SubmitError>,
) {
    match submit(engine) {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                println!("Note: {warning}");
            }
            if let Some(entry) = engine.state().chat().get(outcome.entry_index) {
                print_entry(outcome.entry_index, entry);
            }
        }
        Err(err) => println!("Error: {err}"),
    }
}

fn print_entry(index: usize, entry: &ChatEntry) {
    match entry {
        ChatEntry::User { text } => println!("[{index}] you: {text}"),
        ChatEntry::Image { prompt, images, .. } => {
            println!("[{index}] {} image(s) for \"{prompt}\"", images.len());
            for (image, source) in images.iter().enumerate() {
                println!("    {index}.{image} {}", source.summary());
            }
        }
    }
}

fn print_options(engine: &Engine) {
    let mode = engine.state().mode();
    println!("Options for {mode}:");
    for field in OptionField::ALL {
        println!("  {field} = {}", value_text(&engine.state().options().get(field)));
    }
    let uploads = engine.state().uploads();
    for (label, asset) in [("image", uploads.image.as_ref()), ("mask", uploads.mask.as_ref())] {
        if let Some(asset) = asset {
            println!(
                "  {label}: {} ({}, {} bytes)",
                asset.file_name,
                asset.mime_type,
                asset.byte_len()
            );
        }
    }
}

fn print_models(engine: &Engine) {
    for model in engine.registry().list() {
        let modes: Vec<&str> = model.modes.iter().map(|mode| mode.as_str()).collect();
        println!(
            "{}: modes {}; sizes {}; prompt up to {} chars; n up to {}",
            model.name,
            modes.join(", "),
            model.sizes.join(", "),
            model.prompt_max_chars,
            model.max_n
        );
    }
}

fn print_topics() {
    println!("Suggested topics (/topic <n>):");
    for (idx, (title, prompt)) in SUGGESTED_TOPICS.iter().enumerate() {
        println!("  {}. {title}: {prompt}", idx + 1);
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) if text.is_empty() => "(unset)".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
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

fn index_arg(value: Option<&Value>) -> Option<usize> {
    value
        .and_then(Value::as_u64)
        .and_then(|raw| usize::try_from(raw).ok())
}

fn require_index(value: Option<&Value>, usage: &str) -> Result<usize> {
    index_arg(value).with_context(|| format!("usage: {usage}"))
}

fn run_submit(args: SubmitArgs) -> Result<i32> {
    let mut engine = build_engine(&args.client)?;
    let mode: Mode = args.mode.parse().map_err(anyhow::Error::msg)?;
    engine.change_mode(mode)?;

    let mut settings: Vec<(OptionField, String)> = Vec::new();
    if let Some(model) = args.model.as_ref() {
        settings.push((OptionField::Model, model.clone()));
    }
    if let Some(n) = args.n {
        settings.push((OptionField::N, n.to_string()));
    }
    if let Some(size) = args.size.as_ref() {
        settings.push((OptionField::Size, size.clone()));
    }
    for pair in &args.set {
        settings.push(parse_setting(pair)?);
    }
    for (field, value) in settings {
        if let Some(note) = engine.set_option(field, &value)? {
            eprintln!("note: {note}");
        }
    }

    if let Some(image) = args.image.as_ref() {
        engine.attach_path(UploadSlot::Image, image)?;
    }
    if let Some(mask) = args.mask.as_ref() {
        engine.attach_path(UploadSlot::Mask, mask)?;
    }
    if let Some(script) = args.mask_script.as_ref() {
        engine.draw_mask(&MaskScript::from_path(script)?)?;
    }
    if let Some(prompt) = args.prompt.as_ref() {
        engine.set_prompt(prompt)?;
    }

    let outcome = match engine.submit() {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("editai: {err}");
            return Ok(if err.is_local() { 2 } else { 1 });
        }
    };
    for warning in &outcome.warnings {
        eprintln!("note: {warning}");
    }
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed creating {}", args.out.display()))?;
    for image in 0..outcome.image_count {
        let dest = if outcome.image_count == 1 {
            args.out.clone()
        } else {
            args.out.join(format!("ai-image-{}.png", image + 1))
        };
        let path = engine.download(outcome.entry_index, image, Some(&dest))?;
        println!("{}", path.display());
    }
    Ok(0)
}

fn parse_setting(pair: &str) -> Result<(OptionField, String)> {
    let Some((field, value)) = pair.split_once('=') else {
        bail!("--set expects FIELD=VALUE, got '{pair}'");
    };
    let field: OptionField = field.parse().map_err(anyhow::Error::msg)?;
    Ok((field, value.to_string()))
}

fn run_mask(args: MaskArgs) -> Result<i32> {
    let source = UploadedAsset::from_path(&args.source)?;
    let mut editor = MaskEditor::for_source(&source)?;
    editor.run_script(&MaskScript::from_path(&args.script)?)?;
    let bytes = if args.overlay {
        editor.export_png()?
    } else {
        editor.export_edit_mask()?
    };
    if let Some(parent) = args.out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    fs::write(&args.out, bytes).with_context(|| format!("failed to write {}", args.out.display()))?;
    let (width, height) = editor.dimensions();
    println!(
        "Mask {width}x{height} ({} painted pixels) written to {}",
        editor.painted_pixels(),
        args.out.display()
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;
    use editai_contracts::chat::{parse_intent, ChatEntry, ImageSet};
    use editai_contracts::events::EventWriter;
    use editai_contracts::options::{Mode, OptionField};
    use editai_engine::raster::{probe_dimensions, solid_png};
    use editai_engine::{DryrunTransport, Engine};

    use super::{dispatch, parse_setting, Cli, Command, Flow};

    fn engine() -> Engine {
        Engine::new(Box::new(DryrunTransport), EventWriter::new(None, "cli-test"))
    }

    fn say(engine: &mut Engine, line: &str, dir: &std::path::Path) -> anyhow::Result<Flow> {
        dispatch(engine, &parse_intent(line), dir)
    }

    #[test]
    fn prompt_line_submits_and_regenerates() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = engine();
        say(&mut engine, "/set size 256x256", temp.path())?;
        say(&mut engine, "a red ball", temp.path())?;
        assert_eq!(engine.state().chat().len(), 2);

        say(&mut engine, "/regenerate 1", temp.path())?;
        assert_eq!(engine.state().chat().len(), 2);

        say(&mut engine, "/download 1", temp.path())?;
        let saved = temp.path().join("ai-image.png");
        assert_eq!(probe_dimensions(&fs::read(saved)?)?, (256, 256));
        Ok(())
    }

    #[test]
    fn mode_and_option_commands() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = engine();
        say(&mut engine, "/mode vary", temp.path())?;
        assert_eq!(engine.state().mode(), Mode::Variation);
        say(&mut engine, "/set n 4", temp.path())?;
        assert_eq!(engine.state().options().n, 4);

        assert!(say(&mut engine, "/set colour blue", temp.path()).is_err());
        assert!(say(&mut engine, "/mode paint", temp.path()).is_err());
        assert!(say(&mut engine, "/regenerate", temp.path()).is_err());
        assert_eq!(say(&mut engine, "/quit", temp.path())?, Flow::Quit);
        assert_eq!(say(&mut engine, "/bogus", temp.path())?, Flow::Continue);
        Ok(())
    }

    #[test]
    fn variation_flow_through_commands() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("square.png");
        fs::write(&source, solid_png(16, 16, [0, 80, 160])?)?;
        let mut engine = engine();
        say(&mut engine, "/mode variation", temp.path())?;
        say(&mut engine, "/set n 2", temp.path())?;
        say(&mut engine, "/set size 256x256", temp.path())?;
        say(&mut engine, &format!("/image {}", source.display()), temp.path())?;
        say(&mut engine, "ignored text", temp.path())?;
        assert!(engine.state().chat().is_empty());

        say(&mut engine, "/submit", temp.path())?;
        match engine.state().chat().get(1) {
            Some(ChatEntry::Image { images, .. }) => {
                assert!(matches!(images, ImageSet::Grid(sources) if sources.len() == 2))
            }
            other => panic!("unexpected entry {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn draw_command_attaches_mask() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("photo.png");
        fs::write(&source, solid_png(20, 10, [1, 1, 1])?)?;
        let script = temp.path().join("strokes.json");
        fs::write(
            &script,
            r#"{"actions": [{"op": "stroke", "points": [[2, 2], [18, 8]]}]}"#,
        )?;
        let mut engine = engine();
        say(&mut engine, "/mode edit", temp.path())?;
        say(&mut engine, &format!("/image {}", source.display()), temp.path())?;
        say(&mut engine, &format!("/draw {}", script.display()), temp.path())?;
        let mask = engine.state().uploads().mask.clone();
        assert_eq!(
            mask.map(|asset| probe_dimensions(&asset.bytes).ok()),
            Some(Some((20, 10)))
        );
        Ok(())
    }

    #[test]
    fn submit_args_parse() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "editai",
            "submit",
            "--dryrun",
            "--mode",
            "edit",
            "--prompt",
            "add a hat",
            "--image",
            "in.png",
            "--set",
            "quality=high",
            "--set",
            "background=transparent",
        ])?;
        let Command::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert!(args.client.dryrun);
        assert_eq!(args.set.len(), 2);
        assert_eq!(
            parse_setting(&args.set[0])?,
            (OptionField::Quality, "high".to_string())
        );
        assert!(parse_setting("quality").is_err());
        Ok(())
    }
}
