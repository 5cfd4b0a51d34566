//! The session driver: convert → write → build → load → run → commit.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use goblet_runtime::ExecContext;
use log::{debug, info};

use crate::convert::{self, Config, ConvertResult, DEFAULT_EXPORT_PREFIX};
use crate::error::GobletError;
use crate::loader::{self, CellLibrary};
use crate::session::{SessionId, SessionState};

/// Base package path under which session packages are generated.
pub const SESSION_PKG_BASE: &str = "goblet/sessions";

pub struct RunnerConfig {
    /// Workspace root the host build tool reads sources from.
    pub gopath: PathBuf,
    /// Root owning `pkg/` with built shared objects.
    pub lgopath: PathBuf,
    /// Grace interval granted to user routines after cancellation.
    pub exec_wait: Duration,
    /// Host build tool binary.
    pub build_tool: String,
}

impl RunnerConfig {
    pub fn new(gopath: impl Into<PathBuf>, lgopath: impl Into<PathBuf>) -> RunnerConfig {
        RunnerConfig {
            gopath: gopath.into(),
            lgopath: lgopath.into(),
            exec_wait: goblet_runtime::DEFAULT_EXEC_WAIT,
            build_tool: "go".to_string(),
        }
    }
}

/// Per-cell lifecycle. Every phase returns to `Idle`, on success or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Converting,
    Compiling,
    Loading,
    Running,
}

pub struct Runner {
    conf: RunnerConfig,
    sess_id: SessionId,
    exec_count: u64,
    phase: RunPhase,
    /// Symbol table and checker context; completion and inspection take
    /// this lock to observe an atomic snapshot.
    state: Mutex<SessionState>,
    /// Loaded cell libraries; later cells link against earlier ones.
    loaded: Vec<CellLibrary>,
}

impl Runner {
    pub fn new(conf: RunnerConfig, sess_id: SessionId) -> Runner {
        Runner {
            conf,
            sess_id,
            exec_count: 0,
            phase: RunPhase::Idle,
            state: Mutex::new(SessionState::new()),
            loaded: Vec::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!("cell {}: {:?}", self.exec_count, phase);
        self.phase = phase;
    }

    pub fn exec_count(&self) -> u64 {
        self.exec_count
    }

    pub fn session_id(&self) -> SessionId {
        self.sess_id
    }

    fn session_dir(&self) -> String {
        format!("{}/{}", SESSION_PKG_BASE, self.sess_id.marshal())
    }

    fn convert_config(&self, state: &SessionState, pkg_path: &str) -> Config {
        Config {
            olds: state.olds(),
            old_imports: state.old_imports(),
            def_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            ref_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            pkg_path: pkg_path.to_string(),
            auto_exit_code: true,
            register_vars: true,
        }
    }

    /// Execute one cell. Converter errors leave the session untouched;
    /// build and load errors surface after new names were committed, which
    /// is the documented behavior.
    pub fn run(&mut self, ctx: &ExecContext, src: &str) -> Result<(), GobletError> {
        let result = self.run_phases(ctx, src);
        self.enter(RunPhase::Idle);
        result
    }

    fn run_phases(&mut self, ctx: &ExecContext, src: &str) -> Result<(), GobletError> {
        self.exec_count += 1;
        let pkg_path = format!("{}/exec{}", self.session_dir(), self.exec_count);

        self.enter(RunPhase::Converting);
        let result: ConvertResult = {
            let mut state = self.state.lock().unwrap();
            let conf = self.convert_config(&state, &pkg_path);
            let result = convert::convert(&mut state.ctx, src, &conf)?;
            // Commit new definitions and imports before the build.
            state.merge_package(result.pkg);
            let imports = result.imports.clone();
            state.merge_imports(&imports);
            result
        };

        if result.src.is_empty() {
            // Imports only, or an empty cell.
            return Ok(());
        }

        self.enter(RunPhase::Compiling);
        let pkg_dir = self.conf.gopath.join("src").join(&pkg_path);
        fs::create_dir_all(&pkg_dir).map_err(|e| GobletError::Build {
            message: format!("failed to create {}: {}", pkg_dir.display(), e),
        })?;
        let src_file = pkg_dir.join("src.go");
        fs::write(&src_file, &result.src).map_err(|e| GobletError::Build {
            message: format!("failed to write {}: {}", src_file.display(), e),
        })?;
        debug!("wrote {}", src_file.display());

        let build_pkg_dir = self.conf.lgopath.join("pkg");
        self.build_shared(ctx, &build_pkg_dir, &pkg_path)?;

        self.enter(RunPhase::Loading);
        let lib = loader::load_shared_library(&build_pkg_dir, &pkg_path)?;

        self.enter(RunPhase::Running);
        let lib = loader::run_cell_entry(ctx, lib, &pkg_path, self.conf.exec_wait)?;
        self.loaded.push(lib);
        Ok(())
    }

    /// Invoke the host build tool, killing it if the context is canceled.
    fn build_shared(
        &self,
        ctx: &ExecContext,
        build_pkg_dir: &Path,
        pkg_path: &str,
    ) -> Result<(), GobletError> {
        info!("building {}", pkg_path);
        let mut child = Command::new(&self.conf.build_tool)
            .arg("install")
            .arg("-buildmode=shared")
            .arg("-linkshared")
            .arg("-pkgdir")
            .arg(build_pkg_dir)
            .arg(pkg_path)
            .env("GOPATH", &self.conf.gopath)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| GobletError::Build {
                message: format!("failed to start {}: {}", self.conf.build_tool, e),
            })?;
        loop {
            if let Some(status) = child.try_wait().map_err(|e| GobletError::Build {
                message: format!("failed to wait for build: {}", e),
            })? {
                if status.success() {
                    return Ok(());
                }
                return Err(GobletError::Build {
                    message: format!("failed to build a shared library of {}", pkg_path),
                });
            }
            if ctx.is_done() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GobletError::Canceled {
                    message: "build canceled".to_string(),
                });
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Completion against a snapshot of the session. Does not mutate the
    /// symbol table.
    pub fn complete(&self, src: &str, cursor: usize) -> (Vec<String>, usize, usize) {
        let mut state = self.state.lock().unwrap();
        let conf = Config {
            olds: state.olds(),
            old_imports: state.old_imports(),
            pkg_path: format!("{}/completion", self.session_dir()),
            auto_exit_code: false,
            register_vars: false,
            ..Config::default()
        };
        convert::complete(&mut state.ctx, src, cursor, &conf)
    }

    /// Inspect the identifier at `cursor`: a synthesized document for local
    /// objects, otherwise the host doc tool's output for the query.
    pub fn inspect(&self, src: &str, cursor: usize) -> Result<String, GobletError> {
        let query = {
            let mut state = self.state.lock().unwrap();
            let conf = Config {
                olds: state.olds(),
                old_imports: state.old_imports(),
                pkg_path: format!("{}/inspect", self.session_dir()),
                auto_exit_code: false,
                register_vars: false,
                ..Config::default()
            };
            let result = convert::inspect_ident(&mut state.ctx, src, cursor, &conf);
            if !result.doc.is_empty() {
                return Ok(result.doc);
            }
            if result.query.is_empty() {
                return Ok(String::new());
            }
            result.query
        };
        let output = Command::new(&self.conf.build_tool)
            .arg("doc")
            .arg(&query)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .and_then(|mut child| {
                let mut buf = String::new();
                if let Some(stdout) = child.stdout.as_mut() {
                    let _ = stdout.read_to_string(&mut buf);
                }
                child.wait().map(|_| buf)
            })
            .map_err(|e| GobletError::Load {
                message: format!("doc tool failed: {}", e),
            })?;
        Ok(output.replace(DEFAULT_EXPORT_PREFIX, ""))
    }

    /// Remove generated sources, this session's shared objects, and
    /// sub-build artifacts.
    pub fn clean_session(&self) -> std::io::Result<()> {
        clean_session_files(&self.conf.gopath, &self.conf.lgopath, &self.sess_id)
    }
}

/// Session cleanup by id: usable from wrapper binaries even without a live
/// runner. Missing files are not an error.
pub fn clean_session_files(
    gopath: &Path,
    lgopath: &Path,
    sess_id: &SessionId,
) -> std::io::Result<()> {
    let marshaled = sess_id.marshal();
    let src_dir = gopath
        .join("src")
        .join(SESSION_PKG_BASE)
        .join(&marshaled);
    let mut first_err = remove_all(&src_dir).err();

    let pkg = lgopath.join("pkg");
    let prefix = format!(
        "lib{}-{}-",
        SESSION_PKG_BASE.replace('/', "-"),
        marshaled
    );
    if let Ok(entries) = fs::read_dir(&pkg) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".so") {
                if let Err(e) = fs::remove_file(entry.path()) {
                    first_err.get_or_insert(e);
                }
            }
        }
    }
    let sub_build = pkg.join(SESSION_PKG_BASE).join(&marshaled);
    if let Err(e) = remove_all(&sub_build) {
        first_err.get_or_insert(e);
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn remove_all(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_runner(tmp: &Path) -> Runner {
        let conf = RunnerConfig::new(tmp.join("gopath"), tmp.join("lgopath"));
        Runner::new(conf, SessionId { time: 7 })
    }

    #[test]
    fn converter_error_leaves_session_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let mut runner = test_runner(tmp.path());
        let err = runner
            .run(&ExecContext::background(), "x := undefinedName")
            .unwrap_err();
        assert!(matches!(err, GobletError::Type { .. }));
        // No names were committed.
        let state = runner.state.lock().unwrap();
        assert!(state.olds().is_empty());
        // No files were written.
        assert!(!tmp.path().join("gopath/src").exists());
    }

    #[test]
    fn imports_only_cell_registers_without_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut runner = test_runner(tmp.path());
        runner
            .run(&ExecContext::background(), "import \"fmt\"")
            .unwrap();
        let state = runner.state.lock().unwrap();
        assert_eq!(state.old_imports().len(), 1);
        assert!(!tmp.path().join("gopath/src").exists());
    }

    #[test]
    fn empty_cell_succeeds_without_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut runner = test_runner(tmp.path());
        runner.run(&ExecContext::background(), "").unwrap();
        assert_eq!(runner.exec_count(), 1);
        assert!(!tmp.path().join("gopath/src").exists());
    }

    #[test]
    fn names_commit_even_when_build_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conf = RunnerConfig::new(tmp.path().join("gopath"), tmp.path().join("lgopath"));
        // A build tool that cannot exist.
        conf.build_tool = tmp.path().join("no-such-tool").display().to_string();
        let mut runner = Runner::new(conf, SessionId { time: 7 });
        let err = runner
            .run(&ExecContext::background(), "x := 10")
            .unwrap_err();
        assert!(matches!(err, GobletError::Build { .. }));
        // The generated source was written and the name committed.
        let state = runner.state.lock().unwrap();
        assert_eq!(state.lookup("x").is_some(), true);
        let src_root = tmp.path().join("gopath/src/goblet/sessions");
        assert!(src_root.exists());
    }

    #[test]
    fn clean_session_removes_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let sess = SessionId { time: 9 };
        let marshaled = sess.marshal();
        let gopath = tmp.path().join("gopath");
        let lgopath = tmp.path().join("lgopath");
        let src = gopath.join("src/goblet/sessions").join(&marshaled).join("exec1");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("src.go"), "package lgo_exec\n").unwrap();
        let pkg = lgopath.join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        let so = pkg.join(format!("libgoblet-sessions-{}-exec1.so", marshaled));
        fs::write(&so, b"").unwrap();
        let other = pkg.join("libgoblet-sessions-sessother-exec1.so");
        fs::write(&other, b"").unwrap();

        clean_session_files(&gopath, &lgopath, &sess).unwrap();
        assert!(!src.exists());
        assert!(!so.exists());
        assert!(other.exists());
    }
}
