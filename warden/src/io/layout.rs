//! Initialization helpers for `.warden/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::core::criteria::{Criteria, Criterion};
use crate::io::checklist::render_checklist;
use crate::io::config::{WardenConfig, write_config};

const WARDEN_GITIGNORE: &str = "iterations/\ncontrol/\n";

/// All canonical paths within `.warden/` for a project root.
#[derive(Debug, Clone)]
pub struct WardenPaths {
    pub root: PathBuf,
    pub warden_dir: PathBuf,
    pub state_dir: PathBuf,
    pub control_dir: PathBuf,
    pub iterations_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub checklist_path: PathBuf,
    pub config_path: PathBuf,
    pub session_path: PathBuf,
    pub owner_pid_path: PathBuf,
    pub pause_sentinel_path: PathBuf,
    pub abort_sentinel_path: PathBuf,
}

impl WardenPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let warden_dir = root.join(".warden");
        let state_dir = warden_dir.join("state");
        let control_dir = warden_dir.join("control");
        let iterations_dir = warden_dir.join("iterations");
        Self {
            root: root.clone(),
            warden_dir: warden_dir.clone(),
            state_dir: state_dir.clone(),
            control_dir: control_dir.clone(),
            iterations_dir,
            gitignore_path: warden_dir.join(".gitignore"),
            checklist_path: warden_dir.join("checklist.json"),
            config_path: state_dir.join("config.toml"),
            session_path: state_dir.join("session.json"),
            owner_pid_path: state_dir.join("owner.pid"),
            pause_sentinel_path: control_dir.join("pause"),
            abort_sentinel_path: control_dir.join("abort"),
        }
    }

    /// Audit directory for one iteration of one run.
    pub fn iteration_dir(&self, run_id: &str, iter: u32) -> PathBuf {
        self.iterations_dir.join(run_id).join(iter.to_string())
    }
}

/// Options for `init_layout`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing warden-owned files.
    pub force: bool,
}

/// Create `.warden/` scaffolding in `root`.
///
/// Fails if `.warden/` already exists unless `options.force` is set. Writes
/// the default config and a starter checklist for the operator to edit.
pub fn init_layout(root: &Path, options: &InitOptions) -> Result<WardenPaths> {
    let paths = WardenPaths::new(root);
    if paths.warden_dir.exists() && !options.force {
        return Err(anyhow!(
            "warden init: .warden already exists (use --force to overwrite)"
        ));
    }
    if paths.warden_dir.exists() && !paths.warden_dir.is_dir() {
        return Err(anyhow!("warden init: .warden exists but is not a directory"));
    }

    create_dir(&paths.warden_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.control_dir)?;
    create_dir(&paths.iterations_dir)?;

    write_file(&paths.gitignore_path, WARDEN_GITIGNORE)?;
    write_config(&paths.config_path, &WardenConfig::default())?;
    write_file(&paths.checklist_path, &starter_checklist()?)?;

    Ok(paths)
}

fn starter_checklist() -> Result<String> {
    let criteria = Criteria::new(vec![Criterion {
        number: 1,
        text: "Replace this with the first verifiable criterion".to_string(),
        checked: false,
    }])
    .map_err(|err| anyhow!(err))?;
    render_checklist(&criteria)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_layout_and_starter_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_layout(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.state_dir.is_dir());
        assert!(paths.control_dir.is_dir());
        assert!(paths.iterations_dir.is_dir());
        assert!(paths.config_path.is_file());
        assert!(paths.checklist_path.is_file());

        let gitignore = fs::read_to_string(&paths.gitignore_path).expect("read gitignore");
        assert!(gitignore.contains("iterations/"));
        assert!(gitignore.contains("control/"));
    }

    #[test]
    fn init_refuses_existing_layout_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_layout(temp.path(), &InitOptions { force: false }).expect("first init");
        let err = init_layout(temp.path(), &InitOptions { force: false })
            .expect_err("second init should fail");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn starter_checklist_parses() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_layout(temp.path(), &InitOptions { force: false }).expect("init");
        let criteria =
            crate::io::checklist::load_checklist(&paths.checklist_path).expect("load checklist");
        assert_eq!(criteria.len(), 1);
        assert!(!criteria.all_complete());
    }

    #[test]
    fn iteration_dir_is_stable() {
        let paths = WardenPaths::new("/tmp/project");
        let dir = paths.iteration_dir("run-9", 3);
        assert!(dir.ends_with(Path::new(".warden/iterations/run-9/3")));
    }
}
