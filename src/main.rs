use std::path::PathBuf;

use clap::Parser;
use katana::catalog::{Catalog, CatalogSource, SummaryKind};
use katana::resolve::KEYWORDS;
use katana::{compile_with, lexer, parser, prelude, printer, CompileOptions, KatanaError, Program};
use nu_ansi_term::{Color, Style};
use reedline::{
    DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Highlighter, Reedline, Signal, StyledText,
};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Katana compiler: S-expressions in, Udon assembly out
#[derive(Parser, Debug)]
#[command(name = "katana", version, about, long_about = None)]
struct Cli {
    /// Source file to compile; starts the REPL when omitted
    file: Option<PathBuf>,

    /// JSON catalog of host types, operations and events
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Skip type checking of variables and extern signatures
    #[arg(long)]
    no_type_check: bool,

    /// Print the symbol table after the assembly
    #[arg(long)]
    symbols: bool,

    /// Print the canonical form of the parsed tree before compiling
    #[arg(long)]
    tree: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid catalog {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Katana(#[from] KatanaError),
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        if cli.no_color {
            eprintln!("error: {err}");
        } else {
            eprintln!("{} {err}", Color::Red.bold().paint("error:"));
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let catalog = load_catalog(cli.catalog.as_ref())?;
    let options = CompileOptions::default().with_type_check(!cli.no_type_check);

    let Some(path) = &cli.file else {
        Repl::new(catalog, options, !cli.no_color).run();
        return Ok(());
    };
    let source = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.clone(),
        source,
    })?;
    if cli.tree {
        let tree = parser::parse(&source).map_err(KatanaError::from)?;
        println!("{}", printer::serialize(&tree));
    }
    let program = compile_with(&source, &catalog, &options)?;
    print!("{}", program.assembly);
    if cli.symbols {
        print_symbols(&program, false);
    }
    Ok(())
}

fn load_catalog(path: Option<&PathBuf>) -> Result<Catalog, CliError> {
    let source = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str::<CatalogSource>(&text).map_err(|source| CliError::Json {
                path: path.clone(),
                source,
            })?
        }
        None => prelude::core_source(),
    };
    let catalog = Catalog::from_source(&source).map_err(KatanaError::from)?;
    debug!(operations = catalog.operations().count(), "catalog ready");
    Ok(catalog)
}

fn print_symbols(program: &Program, color: bool) {
    for (name, symbol) in &program.symbols {
        let value = symbol
            .value
            .as_ref()
            .map_or_else(|| "null".to_string(), ToString::to_string);
        let flags = format!("{:?}", symbol.attributes);
        if color {
            println!(
                "  {} {} = {} {}",
                Color::Blue.paint(name),
                Color::Cyan.paint(&symbol.ty),
                Color::White.bold().paint(value),
                Color::DarkGray.paint(flags)
            );
        } else {
            println!("  {name} {} = {value} {flags}", symbol.ty);
        }
    }
    println!("  heap size: {}", program.heap_size);
}

struct KatanaHighlighter;

impl Highlighter for KatanaHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled = StyledText::new();
        let mut rest = line;
        while let Some(ch) = rest.chars().next() {
            let (style, len) = match ch {
                ';' => (Style::new().fg(Color::DarkGray), rest.len()),
                '"' | '\'' => (Style::new().fg(Color::Green), quoted_len(rest, ch)),
                '(' | ')' | ',' => (Style::new().fg(Color::White).bold(), 1),
                '\\' => (Style::new().fg(Color::Purple), 1 + rest[1..].chars().next().map_or(0, char::len_utf8)),
                _ if lexer::is_ignorable(ch) => (Style::new(), ch.len_utf8()),
                _ => {
                    let len = rest
                        .find(|c: char| lexer::STRUCTURAL.contains(&c))
                        .unwrap_or(rest.len());
                    (token_style(rest[..len].trim()), len)
                }
            };
            styled.push((style, rest[..len].to_string()));
            rest = &rest[len..];
        }
        styled
    }
}

/// Byte length of a quoted string starting at `rest`, closing quote included.
fn quoted_len(rest: &str, quote: char) -> usize {
    let mut escaped = false;
    for (index, ch) in rest.char_indices().skip(1) {
        match ch {
            '\\' if !escaped => escaped = true,
            c if c == quote && !escaped => return index + c.len_utf8(),
            _ => escaped = false,
        }
    }
    rest.len()
}

fn token_style(token: &str) -> Style {
    if KEYWORDS.contains(&token) {
        Style::new().fg(Color::Magenta).bold()
    } else if matches!(token.to_ascii_lowercase().as_str(), "true" | "false" | "nil" | "null") {
        Style::new().fg(Color::Yellow).bold()
    } else if lexer::parse_number(token).is_some() {
        Style::new().fg(Color::Yellow)
    } else {
        Style::new().fg(Color::Cyan)
    }
}

struct Repl {
    catalog: Catalog,
    options: CompileOptions,
    color: bool,
    last_source: Option<String>,
    last_program: Option<Program>,
}

impl Repl {
    fn new(catalog: Catalog, options: CompileOptions, color: bool) -> Self {
        Self {
            catalog,
            options,
            color,
            last_source: None,
            last_program: None,
        }
    }

    fn paint(&self, color: Color, text: impl AsRef<str>) -> String {
        if self.color {
            color.paint(text.as_ref()).to_string()
        } else {
            text.as_ref().to_string()
        }
    }

    fn run(&mut self) {
        println!("{}", self.paint(Color::Cyan, "Katana REPL: enter an S-expression to see its assembly"));
        println!("{}", self.paint(Color::DarkGray, "  Type :help for available commands"));
        println!();

        let mut line_editor = Reedline::create().with_highlighter(Box::new(KatanaHighlighter));
        if let Some(history) = home::home_dir()
            .map(|dir| dir.join(".katana_history"))
            .and_then(|path| FileBackedHistory::with_file(1000, path).ok())
        {
            line_editor = line_editor.with_history(Box::new(history));
        }

        let default_prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic("katana".to_string()),
            DefaultPromptSegment::Empty,
        );
        let continuation_prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic("      ".to_string()),
            DefaultPromptSegment::Empty,
        );
        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                &default_prompt
            } else {
                &continuation_prompt
            };
            match line_editor.read_line(prompt) {
                Ok(Signal::Success(line)) => {
                    let trimmed = line.trim();
                    if buffer.is_empty() && trimmed.starts_with(':') {
                        if !self.command(trimmed) {
                            break;
                        }
                        continue;
                    }
                    if let Some(head) = line.trim_end().strip_suffix('\\') {
                        buffer.push_str(head);
                        buffer.push('\n');
                        continue;
                    }
                    buffer.push_str(&line);
                    let input = std::mem::take(&mut buffer);
                    if !input.trim().is_empty() {
                        self.compile_and_display(input);
                    }
                }
                Ok(Signal::CtrlC) => {
                    println!("{}", self.paint(Color::Yellow, "^C (use :exit to quit)"));
                    buffer.clear();
                }
                Ok(Signal::CtrlD) => break,
                Err(err) => {
                    eprintln!("{}", self.paint(Color::Red, format!("error: {err}")));
                    break;
                }
            }
        }
    }

    /// Runs a `:` command; returns false when the REPL should stop.
    fn command(&mut self, input: &str) -> bool {
        let (name, argument) = input.split_once(' ').unwrap_or((input, ""));
        match name {
            ":help" | ":h" => self.show_help(),
            ":query" => self.query(argument.trim()),
            ":tree" => match &self.last_source {
                Some(source) => match parser::parse(source) {
                    Ok(tree) => println!("{}", printer::serialize(&tree)),
                    Err(err) => self.report(&KatanaError::from(err)),
                },
                None => println!("{}", self.paint(Color::DarkGray, "  nothing compiled yet")),
            },
            ":symbols" => match &self.last_program {
                Some(program) => print_symbols(program, self.color),
                None => println!("{}", self.paint(Color::DarkGray, "  nothing compiled yet")),
            },
            ":exit" | ":quit" | ":q" => return false,
            _ => println!("{}", self.paint(Color::Red, format!("Unknown command: {input}"))),
        }
        true
    }

    fn compile_and_display(&mut self, input: String) {
        match compile_with(&input, &self.catalog, &self.options) {
            Ok(program) => {
                println!("{}", self.paint(Color::Blue, "=>"));
                print!("{}", program.assembly);
                self.last_program = Some(program);
            }
            Err(err) => self.report(&err),
        }
        self.last_source = Some(input);
    }

    fn report(&self, err: &KatanaError) {
        println!("{} {}", self.paint(Color::Red, "✗"), self.paint(Color::Red, err.to_string()));
    }

    fn query(&self, text: &str) {
        let mut found = 0;
        for summary in self.catalog.query(text) {
            found += 1;
            let kind = match summary.kind {
                SummaryKind::Type => "type",
                SummaryKind::Constructor => "ctor",
                SummaryKind::Cast => "cast",
                SummaryKind::Operator => "op",
                SummaryKind::Property => "prop",
                SummaryKind::Method => "method",
                SummaryKind::Event => "event",
            };
            println!(
                "  {:<6} {}  {}",
                self.paint(Color::Yellow, kind),
                self.paint(Color::Cyan, &summary.usage),
                self.paint(Color::DarkGray, &summary.signature)
            );
        }
        if found == 0 {
            println!("{}", self.paint(Color::DarkGray, "  no matches"));
        }
    }

    fn show_help(&self) {
        println!();
        println!("  {}  Show this help message", self.paint(Color::Green, ":help, :h"));
        println!("  {}  Search the catalog", self.paint(Color::Green, ":query <text>"));
        println!("  {}  Show the canonical form of the last input", self.paint(Color::Green, ":tree"));
        println!("  {}  Show the symbol table of the last program", self.paint(Color::Green, ":symbols"));
        println!("  {}  Exit the REPL", self.paint(Color::Green, ":exit, :quit, :q"));
        println!();
        println!("  {}", self.paint(Color::DarkGray, "Example: (var(n, Int32, 0), =(n, +($(n), 1)))"));
        println!("  {}", self.paint(Color::DarkGray, "End a line with \\ to continue on the next line"));
        println!();
    }
}
