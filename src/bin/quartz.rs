//! QuartzJS shell
//!
//! Script runner and interactive REPL.
//!
//! Usage: quartz [options] [file ...]
//!   --shell        force interactive mode after scripts
//!   --module       treat the next file as a module
//!   -e EXPR        evaluate EXPR
//!
//! Files ending in .mjs run as modules. Exit code 3 on parse or load
//! failure.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use quartzjs::builtins::global::install_shell_globals;
use quartzjs::context::{
    Context, Globals, ModuleLoadError, ModuleSource, Platform, ThrownError, VmInstance,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// One work item from the command line.
enum Input {
    File { path: String, is_module: bool },
    Source(String),
}

struct Options {
    inputs: Vec<Input>,
    interactive: bool,
}

fn print_help() {
    println!("usage: quartz [options] [file ...]");
    println!("    --shell        go to interactive mode after the scripts");
    println!("    --module       treat the next file as a module");
    println!("    -e EXPR        evaluate EXPR");
    println!("    -h, --help     list options");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut opts = Options {
        inputs: Vec::new(),
        interactive: false,
    };
    let mut next_is_module = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--shell" => opts.interactive = true,
            "--module" => next_is_module = true,
            "-e" => {
                i += 1;
                if i >= args.len() {
                    return Err("-e requires an argument".into());
                }
                opts.inputs.push(Input::Source(args[i].clone()));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("unknown option: {}", arg));
            }
            path => {
                let is_module = next_is_module || path.ends_with(".mjs");
                next_is_module = false;
                opts.inputs.push(Input::File {
                    path: path.to_string(),
                    is_module,
                });
            }
        }
        i += 1;
    }
    Ok(opts)
}

/// Filesystem module loader: specifiers resolve relative to the
/// referrer's directory and deduplicate by canonical path.
struct FsPlatform;

impl Platform for FsPlatform {
    fn on_load_module(
        &self,
        referrer: Option<&str>,
        specifier: &str,
    ) -> Result<ModuleSource, ModuleLoadError> {
        let base = referrer
            .map(Path::new)
            .and_then(|p| p.parent())
            .unwrap_or_else(|| Path::new("."));
        let resolved = base.join(specifier);
        let canonical = resolved
            .canonicalize()
            .unwrap_or_else(|_| resolved.clone());
        let source = std::fs::read_to_string(&canonical).map_err(|e| ModuleLoadError {
            code: 3,
            message: format!("cannot load '{}': {}", resolved.display(), e),
        })?;
        Ok(ModuleSource {
            source,
            name: canonical.to_string_lossy().into_owned(),
        })
    }
}

fn main() {
    let opts = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("quartz: {}", e);
            eprintln!("Use -h for help.");
            std::process::exit(1);
        }
    };

    Globals::initialize();
    let vm = Rc::new(RefCell::new(VmInstance::new(Rc::new(FsPlatform))));
    let mut ctx = Context::new(vm);
    install_shell_globals(&mut ctx);

    let has_inputs = !opts.inputs.is_empty();
    for input in &opts.inputs {
        let (source, name, is_module) = match input {
            Input::Source(src) => (src.clone(), "<command line>".to_string(), false),
            Input::File { path, is_module } => match std::fs::read_to_string(path) {
                Ok(src) => (src, path.clone(), *is_module),
                Err(e) => {
                    eprintln!("quartz: cannot read {}: {}", path, e);
                    std::process::exit(3);
                }
            },
        };
        if !run_source(&mut ctx, &source, &name, is_module, matches!(input, Input::Source(_))) {
            std::process::exit(3);
        }
    }

    if opts.interactive || !has_inputs {
        repl(&mut ctx);
    }
    Globals::finalize();
}

/// Evaluate one chunk, drain jobs, report errors. Returns false on
/// parse or runtime failure.
fn run_source(ctx: &mut Context, source: &str, name: &str, is_module: bool, echo: bool) -> bool {
    let script = match ctx.initialize_script(source, name, is_module) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {}", name, e);
            return false;
        }
    };
    match script.execute(ctx) {
        Ok(value) => {
            if echo && !value.is_undefined() {
                println!("{}", ctx.display_value(value));
            }
        }
        Err(e) => {
            report_thrown(&e);
            return false;
        }
    }
    if let Err(e) = ctx.drain_job_queue() {
        report_thrown(&e);
        return false;
    }
    true
}

fn report_thrown(e: &ThrownError) {
    eprintln!("Uncaught {}", e.message);
    for entry in &e.stack {
        eprintln!("    at {}:{}:{}", entry.src, entry.line, entry.column);
    }
}

fn repl(ctx: &mut Context) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("quartz: cannot initialize line editor: {}", e);
            return;
        }
    };
    let history = history_file();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline("quartz> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                match ctx.eval(line) {
                    Ok(value) => {
                        if !value.is_undefined() {
                            println!("{}", ctx.display_value(value));
                        }
                    }
                    Err(e) => println!("{}", e),
                }
                if let Err(e) = ctx.drain_job_queue() {
                    report_thrown(&e);
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("quartz: input error: {}", e);
                break;
            }
        }
    }
    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
}

fn history_file() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(|home| {
        let mut p = std::path::PathBuf::from(home);
        p.push(".quartz_history");
        p
    })
}
