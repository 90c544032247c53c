//! Driver.
//!
//! Runs the compiler phases selected on the command line and writes each
//! listing to its own file in the output directory. A compile error
//! replaces the contents of every listing the run would have produced.

use anyhow::{self, bail, Context};
use bitflags::bitflags;
use clap::{crate_version, Arg, ArgGroup, Command};
use pascalc::{
    codegen,
    error::{CompileError, Diagnostics, ErrorKind},
    TokenTable,
};

use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process,
};

const TOKENS_FILE: &str = "tokens.txt";
const TREE_FILE: &str = "syntax_tree.txt";
const ASM_FILE: &str = "asm_code.txt";

bitflags! {
    /// Listings to produce.
    struct Outputs: u32 {
        /// Token table.
        const TOKENS = 0x01;

        /// Typed syntax tree.
        const TREE = 0x02;

        /// Assembly listing.
        const ASM = 0x04;
    }
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .env()
        .init()
        .context("Failed to initialize logging")?;

    let args = Command::new("pascalc")
        .version(crate_version!())
        .about("Pascal subset compiler")
        .arg(
            Arg::new("lex")
                .short('l')
                .takes_value(true)
                .value_name("FILE")
                .help("Write the token table"),
        )
        .arg(
            Arg::new("syntax")
                .short('s')
                .takes_value(true)
                .value_name("FILE")
                .help("Write the typed syntax tree"),
        )
        .arg(
            Arg::new("generate")
                .short('g')
                .takes_value(true)
                .value_name("FILE")
                .help("Write the syntax tree and the assembly listing"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("DIR")
                .default_value(".")
                .help("Directory to write listings to"),
        )
        .group(
            ArgGroup::new("mode")
                .args(&["lex", "syntax", "generate"])
                .required(true),
        )
        .try_get_matches();

    // Usage errors exit with 1, help and version with 0
    let args = match args {
        Ok(args) => args,
        Err(error) => {
            let code = if error.use_stderr() { 1 } else { 0 };
            error.print().context("Failed to print usage")?;
            process::exit(code);
        }
    };

    let (path, outputs) = match (
        args.value_of("lex"),
        args.value_of("syntax"),
        args.value_of("generate"),
    ) {
        (Some(path), _, _) => (path, Outputs::TOKENS),
        (_, Some(path), _) => (path, Outputs::TREE),
        (_, _, Some(path)) => (path, Outputs::TREE | Outputs::ASM),
        _ => bail!("No input file"),
    };

    let directory = Path::new(args.value_of("output").unwrap_or("."));
    let file = File::open(path).with_context(|| format!("Failed to open for reading: {}", path))?;

    log::info!("Compiling `{}`", path);
    let code = run(BufReader::new(file), path, outputs, directory)?;

    if code != 0 {
        process::exit(code);
    }

    Ok(())
}

/// Produces the requested listings, returning the exit status.
fn run<R: BufRead>(reader: R, name: &str, outputs: Outputs, directory: &Path) -> anyhow::Result<i32> {
    let tokens_path = directory.join(TOKENS_FILE);
    let tree_path = directory.join(TREE_FILE);
    let asm_path = directory.join(ASM_FILE);

    if outputs.contains(Outputs::TOKENS) {
        return match pascalc::tokenize(reader, name) {
            Ok(tokens) => {
                write(&tokens_path, &TokenTable(&tokens).to_string())?;
                Ok(0)
            }

            Err(error) => report(error, &[tokens_path]),
        };
    }

    let mut listings = vec![tree_path.clone()];
    if outputs.contains(Outputs::ASM) {
        listings.push(asm_path.clone());
    }

    let program = match pascalc::parse_source(reader, name) {
        Ok(program) => program,
        Err(error) => return report(error, &listings),
    };

    write(&tree_path, &program.to_string())?;

    if outputs.contains(Outputs::ASM) {
        match codegen::generate(&program) {
            Ok(code) => write(&asm_path, &code.to_string())?,
            Err(error) => return report(error.into(), &[asm_path]),
        }
    }

    Ok(0)
}

/// Writes an error in place of listings.
fn report(error: CompileError, listings: &[PathBuf]) -> anyhow::Result<i32> {
    let text = error.to_string();
    for path in listings {
        write(path, &text)?;
    }

    log::error!("{}", text);

    let code = error.exit_code();
    let kind = match error.kind() {
        ErrorKind::Lexical => "lexical error",
        ErrorKind::Syntax => "syntax error",
        ErrorKind::Generate => "generation error",
    };

    eprint!("{}", Diagnostics::from(error).kind(kind));
    Ok(code)
}

fn write(path: &Path, contents: &str) -> anyhow::Result<()> {
    fs::write(path, contents)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    log::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let directory = std::env::temp_dir().join(format!("pascalc-{}-{}", name, process::id()));
        fs::create_dir_all(&directory).unwrap();

        directory
    }

    #[test]
    fn listings_are_written() {
        let directory = scratch("listings");
        let source = "var x: integer; begin x := 1; end.";

        let code = run(source.as_bytes(), "test", Outputs::TREE | Outputs::ASM, &directory).unwrap();
        assert_eq!(code, 0);

        let asm = fs::read_to_string(directory.join(ASM_FILE)).unwrap();
        assert!(asm.ends_with("end start\n"));

        let tree = fs::read_to_string(directory.join(TREE_FILE)).unwrap();
        assert!(tree.starts_with("Main : function() : nil"));
    }

    #[test]
    fn errors_replace_listings() {
        let directory = scratch("errors");
        let source = "begin x := 1; end.";

        let code = run(source.as_bytes(), "test", Outputs::TREE | Outputs::ASM, &directory).unwrap();
        assert_eq!(code, 2);

        for file in [TREE_FILE, ASM_FILE] {
            let text = fs::read_to_string(directory.join(file)).unwrap();
            assert_eq!(text, "Lexical error at 1:7: Identifier not found `x`");
        }
    }
}
