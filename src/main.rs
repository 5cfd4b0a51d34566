use std::env;
use std::path::PathBuf;
use std::process;

use goblet::runner::{clean_session_files, Runner, RunnerConfig};
use goblet::session::SessionId;

fn env_dir(name: &str) -> Option<PathBuf> {
    env::var_os(name).map(PathBuf::from).filter(|p| !p.as_os_str().is_empty())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    let mut gopath = env_dir("GOPATH");
    let mut lgopath = env_dir("LGOPATH");
    let mut sess_arg: Option<String> = None;
    let mut clean_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--gopath" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --gopath requires a directory argument");
                    process::exit(1);
                }
                gopath = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--lgopath" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --lgopath requires a directory argument");
                    process::exit(1);
                }
                lgopath = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--sess_id" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --sess_id requires a session id argument");
                    process::exit(1);
                }
                sess_arg = Some(args[i + 1].clone());
                i += 2;
            }
            "--clean" => {
                clean_only = true;
                i += 1;
            }
            other => {
                eprintln!("Usage: goblet [--gopath <dir>] [--lgopath <dir>] [--sess_id <id>] [--clean]");
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
    }

    let gopath = match gopath {
        Some(p) => p,
        None => {
            eprintln!("GOPATH is not set");
            process::exit(1);
        }
    };
    let lgopath = match lgopath {
        Some(p) => p,
        None => {
            eprintln!("LGOPATH is not set");
            process::exit(1);
        }
    };

    let sess_id = match &sess_arg {
        Some(raw) => match SessionId::unmarshal(raw) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Bad --sess_id: {}", e);
                process::exit(1);
            }
        },
        None => SessionId::new(),
    };

    if clean_only {
        if let Err(e) = clean_session_files(&gopath, &lgopath, &sess_id) {
            eprintln!("Clean-up failure: {}", e);
            process::exit(1);
        }
        return;
    }

    let conf = RunnerConfig::new(gopath.clone(), lgopath.clone());
    let mut runner = Runner::new(conf, sess_id);
    goblet::repl::run(&mut runner);

    if let Err(e) = runner.clean_session() {
        eprintln!("Clean-up failure: {}", e);
        process::exit(1);
    }
}
