use clap::Parser;
use rebasic::error::CompileError;
use rebasic::lexer::Lexer;
use rebasic::transpiler::Transpiler;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The BASIC source file to transpile
    input: PathBuf,

    /// The path to write the Rust output to (stdout when omitted)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Print the program back as a canonical listing instead of transpiling
    #[arg(long)]
    dump_ast: bool,
}

fn main() {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("could not read file '{}': {}", cli.input.display(), e);
            process::exit(1);
        }
    };

    if cli.dump_ast {
        match listing(&source) {
            Ok(listing) => print!("{}", listing),
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
        return;
    }

    let rust = match Transpiler::transpile(&source) {
        Ok(rust) => rust,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    match cli.output {
        Some(path) => {
            if let Err(e) = fs::write(&path, rust) {
                eprintln!("could not write file '{}': {}", path.display(), e);
                process::exit(1);
            }
        }
        None => print!("{}", rust),
    }
}

fn listing(source: &str) -> Result<String, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = rebasic::parser::Parser::new(tokens).parse_program()?;
    Ok(program.to_string())
}
