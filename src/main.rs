//! mdepub - Build EPUB books from directories of Markdown documents

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mdepub::book::{AssetResolver, build_chapters, compile_book};
use mdepub::markdown::DEFAULT_THEME;
use mdepub::{BookMetadata, EpubBuilder, EpubConfig, MarkdownRenderer, Packager, RenderConfig};

#[derive(Parser)]
#[command(name = "mdepub")]
#[command(version, about = "Build an EPUB from a directory of Markdown documents", long_about = None)]
#[command(after_help = "EXAMPLES:
    mdepub docs/it book.epub --title \"Il manuale del buon dev\" --language it
    mdepub docs/it book.epub --cover cover.jpg --css style.css --asset-root ..
    mdepub docs/it --dump-tree              Print the chapter tree as JSON")]
struct Cli {
    /// Directory containing the Markdown documents
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Output EPUB file
    #[arg(value_name = "OUTPUT", required_unless_present = "dump_tree")]
    output: Option<PathBuf>,

    /// Book title
    #[arg(long, default_value = "Untitled")]
    title: String,

    /// Book author (repeatable)
    #[arg(long)]
    author: Vec<String>,

    /// Book language (BCP 47)
    #[arg(long, default_value = "en")]
    language: String,

    /// Unique identifier, e.g. urn:uuid:... (derived from the title if omitted)
    #[arg(long)]
    identifier: Option<String>,

    /// Cover image
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Stylesheet linked from every section
    #[arg(long)]
    css: Option<PathBuf>,

    /// URL prefix stripped from image references before resolving them
    #[arg(long, default_value = "/book")]
    asset_prefix: String,

    /// Directory image references resolve against
    #[arg(long, default_value = ".")]
    asset_root: PathBuf,

    /// Syntax highlighting theme for code blocks
    #[arg(long, default_value = DEFAULT_THEME)]
    theme: String,

    /// Tab width inside code blocks
    #[arg(long, default_value_t = 2)]
    tab_width: usize,

    /// Do not number code block lines
    #[arg(long)]
    no_line_numbers: bool,

    /// Deflate compression level (0-9)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9))]
    compression_level: Option<u32>,

    /// Print the chapter tree as JSON instead of writing a book
    #[arg(long)]
    dump_tree: bool,

    /// Log every document and image
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> mdepub::Result<()> {
    let renderer = MarkdownRenderer::with_config(RenderConfig {
        theme: cli.theme.clone(),
        tab_width: cli.tab_width,
        line_numbers: !cli.no_line_numbers,
    })?;

    if cli.dump_tree {
        let chapters = build_chapters(&renderer, &cli.source)?;
        let json = serde_json::to_string_pretty(&chapters).map_err(std::io::Error::other)?;
        println!("{json}");
        return Ok(());
    }

    let Some(output) = cli.output.as_deref() else {
        return Ok(());
    };

    let mut metadata = BookMetadata::new(&cli.title).with_language(&cli.language);
    for author in &cli.author {
        metadata = metadata.with_author(author);
    }
    if let Some(identifier) = &cli.identifier {
        metadata = metadata.with_identifier(identifier);
    }

    let mut epub = EpubBuilder::new(metadata).with_config(EpubConfig {
        compression_level: cli.compression_level,
    });

    if let Some(cover) = &cli.cover {
        let id = epub.add_image(cover, &file_name(cover))?;
        epub.set_cover(&id)?;
    }
    let css = match &cli.css {
        Some(path) => Some(epub.add_css(path, &file_name(path))?),
        None => None,
    };

    let resolver = AssetResolver::new(&cli.asset_root).with_prefix(&cli.asset_prefix);
    let (_, summary) = compile_book(&renderer, &mut epub, &cli.source, &resolver, css.as_deref())?;

    epub.write(output)?;

    info!(
        chapters = summary.chapters,
        images = summary.images,
        sections = summary.sections,
        "wrote {}",
        output.display()
    );
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset".to_string())
}
