//! cinder-drv - Driver
//!
//! Orchestrates one toolchain invocation: read the input, run the
//! appropriate pipeline, render diagnostics, write the output. Two
//! pipelines are wired up:
//!
//! - the default Cinder compile: lex → parse → build → bytecode header;
//! - `-E`: treat the input as C, preprocess, and print the token stream.
//!
//! Diagnostics are written to stderr in `file:line:col: level: message`
//! form. The output file is written only when no error-level diagnostic
//! was reported.

use std::io::Write;
use std::path::{Path, PathBuf};

use bumpalo::Bump;
use cinder_lang::{BytecodeBuilder, Lexer, Parser};
use cinder_pp::{PpToken, Preprocessor};
use cinder_util::{Fatal, Handler, Symbol};

/// Exit code for a run that reported error diagnostics.
pub const EXIT_DIAGNOSTICS: i32 = 1;
/// Exit code for a usage or I/O failure.
pub const EXIT_FAILURE: i32 = 1;

/// Options for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Input source file.
    pub input: PathBuf,
    /// Output path; defaults to the input with a `.bc` extension.
    pub output: Option<PathBuf>,
    /// User include directories (`-I`), searched in order.
    pub include_dirs: Vec<PathBuf>,
    /// System include directories, searched after the user ones.
    pub system_dirs: Vec<PathBuf>,
    /// Preprocess as C and print tokens instead of compiling.
    pub preprocess: bool,
}

impl Config {
    /// The resolved output path.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension("bc"))
    }
}

/// One toolchain invocation.
pub struct Session {
    config: Config,
    handler: Handler,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handler: Handler::new(),
        }
    }

    /// Run the session; returns the process exit code.
    pub fn run(&mut self) -> i32 {
        let result = if self.config.preprocess {
            self.run_preprocess()
        } else {
            self.run_compile()
        };

        let _ = self.handler.render_to(&mut std::io::stderr());
        match result {
            Err(fatal) => {
                eprintln!("error: {fatal}");
                EXIT_FAILURE
            }
            Ok(()) if self.handler.has_errors() => EXIT_DIAGNOSTICS,
            Ok(()) => 0,
        }
    }

    /// `-E`: run the C preprocessor and print the token stream.
    fn run_preprocess(&mut self) -> Result<(), Fatal> {
        let arena = Bump::new();
        let tokens = {
            let mut pp = Preprocessor::new(&arena, &self.handler);
            for dir in &self.config.include_dirs {
                pp.add_include_dir(dir);
            }
            for dir in &self.config.system_dirs {
                pp.add_system_dir(dir);
            }
            pp.pp_tokens_file(&self.config.input)?
        };
        if self.handler.has_errors() {
            return Ok(());
        }

        let rendered = render_token_stream(&tokens);
        match &self.config.output {
            Some(path) => std::fs::write(path, rendered).map_err(|source| Fatal::Output {
                path: path.clone(),
                source,
            })?,
            None => {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(rendered.as_bytes());
            }
        }
        Ok(())
    }

    /// Compile a Cinder source file to a bytecode file.
    fn run_compile(&mut self) -> Result<(), Fatal> {
        let path = &self.config.input;
        let source = std::fs::read_to_string(path).map_err(|source| Fatal::Io {
            path: path.clone(),
            source,
        })?;
        let file = Symbol::intern(&path.display().to_string());

        tracing::debug!(file = %file, "lexing");
        let tokens = Lexer::new(&source, file, &self.handler).tokenize();

        tracing::debug!("parsing");
        let program = Parser::new(tokens, &self.handler).parse_program();

        tracing::debug!("building bytecode");
        let mut builder = BytecodeBuilder::new(&self.handler);
        builder.process(&program);

        if self.handler.has_errors() {
            return Ok(());
        }

        let output = self.config.output_path();
        let mut out = std::fs::File::create(&output).map_err(|source| Fatal::Output {
            path: output.clone(),
            source,
        })?;
        builder.emit(&mut out).map_err(|source| Fatal::Output {
            path: output.clone(),
            source,
        })?;
        tracing::debug!(output = %output.display(), "wrote bytecode");
        Ok(())
    }
}

/// Render preprocessed tokens, preserving line structure: a token that
/// started a line starts a line in the output.
fn render_token_stream(tokens: &[PpToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        if token.is_eof() {
            break;
        }
        if token.at_line_start && !out.is_empty() {
            out.push('\n');
        } else if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&token.to_string());
    }
    out.push('\n');
    out
}

/// Convenience for one-shot invocations.
pub fn run(config: Config) -> i32 {
    Session::new(config).run()
}

/// Check that a path exists and is a file, for early CLI validation.
pub fn validate_input(path: &Path) -> Result<(), String> {
    if path.is_file() {
        Ok(())
    } else {
        Err(format!("input file '{}' does not exist", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_util::Span;
    use cinder_pp::PpTokenKind;

    fn ident(name: &str, at_line_start: bool) -> PpToken {
        let mut token = PpToken::new(
            PpTokenKind::Ident(Symbol::intern(name)),
            Span::DUMMY,
        );
        token.at_line_start = at_line_start;
        token
    }

    #[test]
    fn token_stream_rendering_preserves_lines() {
        let tokens = vec![
            ident("int", true),
            ident("x", false),
            ident("y", true),
        ];
        assert_eq!(render_token_stream(&tokens), "int x\ny\n");
    }

    #[test]
    fn output_path_defaults_to_bc() {
        let config = Config {
            input: PathBuf::from("dir/prog.cn"),
            output: None,
            include_dirs: Vec::new(),
            system_dirs: Vec::new(),
            preprocess: false,
        };
        assert_eq!(config.output_path(), PathBuf::from("dir/prog.bc"));
    }
}
