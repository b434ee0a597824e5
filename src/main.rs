use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use mpm_editor::{logging, replay_bundle, Bundle, Config, HttpBackend, Result, Session};

#[derive(Parser, Debug)]
#[command(name = "mpm-editor", version, about = "Performance annotation editor tools")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an MEI transcription into MSM through the backend
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the edit history and argumentation tracks of a bundle
    Inspect { bundle: PathBuf },
    /// Rebuild the MPM of a bundle from its history
    Replay {
        bundle: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render a bundle to MIDI through the backend
    Perform {
        bundle: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading configuration: {}", e);
            process::exit(1);
        }
    };
    logging::init(&config.log_level);

    if let Err(e) = run(cli.command, config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Convert { input, output } => {
            let mei = fs::read_to_string(&input)?;
            let backend = HttpBackend::from_config(&config)?;
            let mut session = Session::new(config);
            session.import_mei(&backend, &mei)?;
            emit(output.as_deref(), session.document().msm.to_xml()?.as_bytes(), "MSM")
        }
        Command::Inspect { bundle } => {
            let bundle = Bundle::load(&bundle)?;
            let mut session = Session::new(config);
            session.import_bundle(&bundle)?;
            inspect(&session);
            Ok(())
        }
        Command::Replay { bundle, output } => {
            let mpm = replay_bundle(&Bundle::load(&bundle)?)?;
            emit(output.as_deref(), mpm.as_bytes(), "MPM")
        }
        Command::Perform { bundle, output } => {
            let backend = HttpBackend::from_config(&config)?;
            let mut session = Session::new(config);
            session.import_bundle(&Bundle::load(&bundle)?)?;
            let midi = session.play(&backend, None)?;
            emit(Some(output.as_path()), midi, "MIDI")
        }
    }
}

fn inspect(session: &Session) {
    let history = session.history();
    println!("{} transformer(s)", history.len());
    for transformer in history.transformers() {
        println!(
            "  {:<6} {:<14} argumentation={} created={}",
            transformer.id,
            transformer.name(),
            transformer.argumentation,
            transformer.created.len()
        );
    }

    let groups = session.argumentation_layout();
    println!("{} argumentation group(s)", groups.len());
    for placed in groups {
        let title = history
            .argumentation(&placed.group.argumentation_id)
            .map_or("", |a| a.note.as_str());
        println!(
            "  track {} [{}, {}] {} {:?} {}",
            placed.track,
            placed.span.start,
            placed.span.end,
            placed.group.argumentation_id,
            placed.group.members,
            title
        );
    }
}

fn emit(path: Option<&Path>, bytes: &[u8], what: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, bytes)?;
            eprintln!("Wrote {} to {}", what, path.display());
        }
        None => println!("{}", String::from_utf8_lossy(bytes)),
    }
    Ok(())
}
