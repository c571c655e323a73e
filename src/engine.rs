//! # Build Engine
//!
//! Drives the external build engine (EasyBuild's `eb`) over a build plan.
//!
//! Entries are built strictly in plan order, one at a time. An entry whose
//! module is already installed is skipped unless a rebuild was requested.
//! When an entry fails, every later entry that depends on it (directly or
//! through another skipped entry) is skipped. Nothing is retried.
//!
//! This module also holds the filesystem collaborators of a build run: the
//! scan of installed modules, the installation of license files and the
//! cleanup of EasyBuild's scratch directories around every build.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use glob::Pattern;
use log::{debug, error, info};
use walkdir::WalkDir;

use crate::defaults::{
    BUILD_ENGINE_PROGRAM, EASYBUILD_CONFIG_ENV, ENGINE_TMP_PATTERN, LICENSE_EXTENSION,
};
use crate::error::{Error, Result};
use crate::plan::{BuildPlan, PlanEntry};
use crate::recipes::RecipeStore;

/// Builds and installs one package from its recipe.
pub trait BuildEngine {
    fn build(&mut self, entry: &PlanEntry, recipe: &Path) -> Result<()>;
}

/// Runs `eb --robot --rpath <recipe>`, with the engine's output going
/// straight to the terminal.
#[derive(Debug, Clone)]
pub struct EasyBuildEngine {
    program: String,
    config_file: Option<PathBuf>,
    scratch: Option<ScratchDirs>,
}

impl EasyBuildEngine {
    pub fn new() -> Self {
        Self {
            program: BUILD_ENGINE_PROGRAM.to_string(),
            config_file: None,
            scratch: None,
        }
    }

    /// Cleans `scratch` before every build and again after a successful one.
    pub fn with_scratch(mut self, scratch: ScratchDirs) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Passes the EasyBuild configuration file through `EASYBUILD_CONFIGFILES`.
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, recipe: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--robot").arg("--rpath").arg(recipe);
        if let Some(file) = &self.config_file {
            cmd.env(EASYBUILD_CONFIG_ENV, file);
        }
        cmd
    }
}

impl Default for EasyBuildEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildEngine for EasyBuildEngine {
    fn build(&mut self, entry: &PlanEntry, recipe: &Path) -> Result<()> {
        match &self.scratch {
            Some(scratch) => scratch.around(|| self.run(entry, recipe)),
            None => self.run(entry, recipe),
        }
    }
}

impl EasyBuildEngine {
    fn run(&self, entry: &PlanEntry, recipe: &Path) -> Result<()> {
        debug!("Running {} --robot --rpath {}", self.program, recipe.display());
        let status = self
            .command(recipe)
            .status()
            .map_err(|e| Error::Build {
                entry: entry.key(),
                message: format!("cannot run '{}': {}", self.program, e),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Build {
                entry: entry.key(),
                message: match status.code() {
                    Some(code) => format!("{} exited with status {}", self.program, code),
                    None => format!("{} was terminated by a signal", self.program),
                },
            })
        }
    }
}

/// Scratch space EasyBuild fills during a build: `eb-*` directories in the
/// temp directory and everything inside the configured build path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchDirs {
    tmp_dir: PathBuf,
    buildpath: PathBuf,
}

impl ScratchDirs {
    pub fn new(buildpath: impl Into<PathBuf>) -> Self {
        Self {
            tmp_dir: std::env::temp_dir(),
            buildpath: buildpath.into(),
        }
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    /// Removes the engine's temp directories and empties the build path,
    /// keeping the build path itself. Returns the number of entries removed.
    pub fn clean(&self) -> Result<usize> {
        let pattern = Pattern::new(ENGINE_TMP_PATTERN)?;
        let mut removed = 0;

        for entry in children(&self.tmp_dir)? {
            if entry.file_type().is_dir() && pattern.matches(&entry.file_name().to_string_lossy()) {
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        for entry in children(&self.buildpath)? {
            if entry.file_type().is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
            removed += 1;
        }

        debug!(
            "Removed {} scratch entr{} from {} and {}",
            removed,
            if removed == 1 { "y" } else { "ies" },
            self.tmp_dir.display(),
            self.buildpath.display()
        );
        Ok(removed)
    }

    /// Cleans, runs `f`, and cleans again only if `f` succeeded. A failed
    /// build keeps its scratch files so the EasyBuild logs can be read.
    pub fn around<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.clean()?;
        let value = f()?;
        self.clean()?;
        Ok(value)
    }
}

/// Direct children of `dir`, or nothing when `dir` does not exist.
fn children(dir: &Path) -> Result<Vec<walkdir::DirEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .map(|entry| {
            entry.map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "cannot list {}: {}",
                    dir.display(),
                    e
                )))
            })
        })
        .collect()
}

/// Modules already present under the installation prefix, as
/// `name-version` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledModules {
    modules: BTreeSet<String>,
}

impl InstalledModules {
    /// Reads `<installpath>/modules/all/<name>/<version>.lua`. A missing
    /// module tree means nothing is installed yet.
    pub fn scan(installpath: &Path) -> Result<Self> {
        let root = installpath.join("modules").join("all");
        let mut modules = BTreeSet::new();

        if !root.is_dir() {
            debug!("No module tree at {}", root.display());
            return Ok(Self { modules });
        }

        for name_dir in fs::read_dir(&root)? {
            let name_dir = name_dir?;
            if !name_dir.file_type()?.is_dir() {
                continue;
            }
            let name = name_dir.file_name().to_string_lossy().into_owned();
            for file in fs::read_dir(name_dir.path())? {
                let file = file?;
                let file_name = file.file_name().to_string_lossy().into_owned();
                if let Some(version) = file_name.strip_suffix(".lua") {
                    modules.insert(format!("{}-{}", name, version));
                }
            }
        }

        debug!("Found {} installed module(s) under {}", modules.len(), root.display());
        Ok(Self { modules })
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, entry: &PlanEntry) -> bool {
        self.modules.contains(&entry.entry.module_key())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// True when `entry` has to go through the engine.
pub fn needs_build(entry: &PlanEntry, installed: &InstalledModules, rebuild: bool) -> bool {
    rebuild || !installed.contains(entry)
}

/// Locates the recipe of every entry that needs building.
///
/// Returns recipe paths keyed by plan key, or `MissingRecipes` naming every
/// recipe file that could not be found.
pub fn verify_recipes(
    plan: &BuildPlan,
    store: &RecipeStore,
    installed: &InstalledModules,
    rebuild: bool,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut found = BTreeMap::new();
    let mut missing = Vec::new();

    for entry in plan.iter().filter(|e| needs_build(e, installed, rebuild)) {
        match store.locate(&entry.entry.identifier) {
            Some(path) => {
                found.insert(entry.key(), path.to_path_buf());
            }
            None => missing.push(entry.entry.recipe_file_name()),
        }
    }

    if missing.is_empty() {
        Ok(found)
    } else {
        Err(Error::MissingRecipes { recipes: missing })
    }
}

/// Copies every `*.lic` file of the stack repository into `dest` unless an
/// identical file is already there. Returns the files written.
pub fn install_license_files(stack_repo: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(&format!("*{}", LICENSE_EXTENSION))?;
    let mut written = Vec::new();

    for entry in WalkDir::new(stack_repo)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.map_err(|e| {
            std::io::Error::other(format!("cannot walk {}: {}", stack_repo.display(), e))
        })?;
        if !entry.file_type().is_file() || !pattern.matches(&entry.file_name().to_string_lossy()) {
            continue;
        }

        let target = dest.join(entry.file_name());
        let content = fs::read(entry.path())?;
        if fs::read(&target).map(|existing| existing == content).unwrap_or(false) {
            continue;
        }

        fs::create_dir_all(dest)?;
        fs::write(&target, &content)?;
        info!("Installed license file {}", target.display());
        written.push(target);
    }
    Ok(written)
}

/// What happened to one plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Built,
    AlreadyInstalled,
    Failed { message: String },
    /// Not attempted because `dependency` failed or was skipped.
    Skipped { dependency: String },
}

impl BuildStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed { .. } | BuildStatus::Skipped { .. })
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Built => write!(f, "built"),
            BuildStatus::AlreadyInstalled => write!(f, "already installed"),
            BuildStatus::Failed { message } => write!(f, "failed: {}", message),
            BuildStatus::Skipped { dependency } => {
                write!(f, "skipped, dependency {} not available", dependency)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub key: String,
    pub status: BuildStatus,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub outcomes: Vec<BuildOutcome>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_failure())
    }

    pub fn count(&self, predicate: impl Fn(&BuildStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }

    pub fn status_of(&self, key: &str) -> Option<&BuildStatus> {
        self.outcomes.iter().find(|o| o.key == key).map(|o| &o.status)
    }
}

/// Builds the plan in order through `engine`.
///
/// `recipes` maps plan keys to recipe paths, as returned by
/// [`verify_recipes`]. An entry to build without a recipe fails.
pub fn run_plan<E>(
    plan: &BuildPlan,
    recipes: &BTreeMap<String, PathBuf>,
    engine: &mut E,
    installed: &InstalledModules,
    rebuild: bool,
) -> BuildReport
where
    E: BuildEngine + ?Sized,
{
    let started = Instant::now();
    let mut unavailable: HashSet<String> = HashSet::new();
    let mut outcomes = Vec::with_capacity(plan.len());
    let total = plan.len();

    for (index, entry) in plan.iter().enumerate() {
        let key = entry.key();
        let entry_started = Instant::now();

        let status = if let Some(dependency) =
            entry.dependencies.iter().find(|d| unavailable.contains(*d))
        {
            BuildStatus::Skipped {
                dependency: dependency.clone(),
            }
        } else if !needs_build(entry, installed, rebuild) {
            BuildStatus::AlreadyInstalled
        } else if let Some(recipe) = recipes.get(&key) {
            info!("[{}/{}] Building {}", index + 1, total, key);
            match engine.build(entry, recipe) {
                Ok(()) => BuildStatus::Built,
                Err(e) => BuildStatus::Failed {
                    message: e.to_string(),
                },
            }
        } else {
            BuildStatus::Failed {
                message: format!("no recipe {}", entry.entry.recipe_file_name()),
            }
        };

        let elapsed = entry_started.elapsed();
        match &status {
            BuildStatus::Built => info!("Built {} in {:.1?}", key, elapsed),
            BuildStatus::AlreadyInstalled => debug!("{} is already installed", key),
            other => {
                error!("{}: {}", key, other);
                unavailable.insert(key.clone());
            }
        }
        outcomes.push(BuildOutcome {
            key,
            status,
            elapsed,
        });
    }

    BuildReport {
        outcomes,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::package_list::{PackageEntry, Restriction};
    use crate::plan::build;
    use tempfile::TempDir;

    /// Records build calls and fails the entries it is told to.
    #[derive(Default)]
    struct ScriptedEngine {
        fail: Vec<String>,
        built: Vec<String>,
    }

    impl BuildEngine for ScriptedEngine {
        fn build(&mut self, entry: &PlanEntry, _recipe: &Path) -> Result<()> {
            self.built.push(entry.key());
            if self.fail.contains(&entry.key()) {
                return Err(Error::Build {
                    entry: entry.key(),
                    message: "eb exited with status 1".to_string(),
                });
            }
            Ok(())
        }
    }

    /// zlib <- libpng <- app, and an independent tool.
    fn sample_plan() -> BuildPlan {
        let entries: Vec<PackageEntry> = ["zlib-1.2.11", "libpng-1.6.37", "app-1.0", "tool-2.0"]
            .iter()
            .enumerate()
            .map(|(i, id)| PackageEntry::new(id, Restriction::Unrestricted, i + 1))
            .collect();
        let deps = BTreeMap::from([
            ("libpng-1.6.37".to_string(), vec!["zlib-1.2.11".to_string()]),
            ("app-1.0".to_string(), vec!["libpng-1.6.37".to_string()]),
        ]);
        build(&entries, Node::Ubelix, &[], &deps).unwrap()
    }

    fn recipes_for(plan: &BuildPlan) -> BTreeMap<String, PathBuf> {
        plan.iter()
            .map(|e| (e.key(), PathBuf::from(e.entry.recipe_file_name())))
            .collect()
    }

    #[test]
    fn test_run_plan_builds_everything_in_order() {
        let plan = sample_plan();
        let mut engine = ScriptedEngine::default();
        let report = run_plan(
            &plan,
            &recipes_for(&plan),
            &mut engine,
            &InstalledModules::default(),
            false,
        );

        assert_eq!(engine.built, plan.keys());
        assert!(!report.has_failures());
        assert_eq!(report.count(|s| *s == BuildStatus::Built), 4);
    }

    #[test]
    fn test_run_plan_skips_installed_unless_rebuild() {
        let plan = sample_plan();
        let installed = InstalledModules::from_keys(["zlib-1.2.11", "tool-2.0"]);

        let mut engine = ScriptedEngine::default();
        let report = run_plan(&plan, &recipes_for(&plan), &mut engine, &installed, false);
        assert_eq!(engine.built, vec!["libpng-1.6.37", "app-1.0"]);
        assert_eq!(
            report.status_of("zlib-1.2.11"),
            Some(&BuildStatus::AlreadyInstalled)
        );

        let mut engine = ScriptedEngine::default();
        run_plan(&plan, &recipes_for(&plan), &mut engine, &installed, true);
        assert_eq!(engine.built.len(), 4);
    }

    #[test]
    fn test_failure_skips_dependents_without_retry() {
        let plan = sample_plan();
        let mut engine = ScriptedEngine {
            fail: vec!["zlib-1.2.11".to_string()],
            ..Default::default()
        };
        let report = run_plan(
            &plan,
            &recipes_for(&plan),
            &mut engine,
            &InstalledModules::default(),
            false,
        );

        assert_eq!(engine.built, vec!["zlib-1.2.11", "tool-2.0"]);
        assert!(report.has_failures());
        assert_eq!(
            report.status_of("libpng-1.6.37"),
            Some(&BuildStatus::Skipped {
                dependency: "zlib-1.2.11".to_string()
            })
        );
        assert_eq!(
            report.status_of("app-1.0"),
            Some(&BuildStatus::Skipped {
                dependency: "libpng-1.6.37".to_string()
            })
        );
        assert_eq!(report.status_of("tool-2.0"), Some(&BuildStatus::Built));
    }

    #[test]
    fn test_entry_without_recipe_fails() {
        let plan = sample_plan();
        let mut recipes = recipes_for(&plan);
        recipes.remove("tool-2.0");

        let mut engine = ScriptedEngine::default();
        let report = run_plan(&plan, &recipes, &mut engine, &InstalledModules::default(), false);
        assert!(matches!(
            report.status_of("tool-2.0"),
            Some(BuildStatus::Failed { message }) if message.contains("tool-2.0.eb")
        ));
    }

    #[test]
    fn test_installed_modules_scan() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("modules/all");
        fs::create_dir_all(root.join("zlib")).unwrap();
        fs::create_dir_all(root.join("Python")).unwrap();
        fs::write(root.join("zlib/1.2.11.lua"), "").unwrap();
        fs::write(root.join("Python/3.9.5-GCCcore-10.3.0.lua"), "").unwrap();
        fs::write(root.join("Python/.modulerc.lua~"), "").unwrap();
        fs::write(root.join("README"), "").unwrap();

        let installed = InstalledModules::scan(temp.path()).unwrap();
        assert_eq!(installed.len(), 2);

        let plan = build(
            &[PackageEntry::new(
                "Python-3.9.5-GCCcore-10.3.0.eb",
                Restriction::Unrestricted,
                1,
            )],
            Node::Ibu,
            &[],
            &BTreeMap::new(),
        )
        .unwrap();
        assert!(installed.contains(&plan.entries[0]));
    }

    #[test]
    fn test_installed_modules_scan_without_tree() {
        let temp = TempDir::new().unwrap();
        assert!(InstalledModules::scan(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_verify_recipes_reports_all_missing() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("zlib-1.2.11.eb"), "").unwrap();
        let store = RecipeStore::open(&[temp.path().to_path_buf()]).unwrap();
        let plan = sample_plan();

        let err = verify_recipes(&plan, &store, &InstalledModules::default(), false).unwrap_err();
        match err {
            Error::MissingRecipes { recipes } => assert_eq!(
                recipes,
                vec!["libpng-1.6.37.eb", "app-1.0.eb", "tool-2.0.eb"]
            ),
            other => panic!("expected missing recipes, got {:?}", other),
        }

        let installed = InstalledModules::from_keys(["libpng-1.6.37", "app-1.0", "tool-2.0"]);
        let found = verify_recipes(&plan, &store, &installed, false).unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["zlib-1.2.11"]);
    }

    #[test]
    fn test_install_license_files_copies_new_and_changed() {
        let repo = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(repo.path().join("licenses")).unwrap();
        fs::create_dir_all(repo.path().join(".git")).unwrap();
        fs::write(repo.path().join("licenses/matlab.lic"), "A").unwrap();
        fs::write(repo.path().join("intel.lic"), "B").unwrap();
        fs::write(repo.path().join(".git/ignored.lic"), "C").unwrap();
        fs::write(repo.path().join("notes.txt"), "D").unwrap();
        let dest_dir = dest.path().join("licenses");

        let written = install_license_files(repo.path(), &dest_dir).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(fs::read_to_string(dest_dir.join("matlab.lic")).unwrap(), "A");
        assert!(!dest_dir.join("ignored.lic").exists());

        assert!(install_license_files(repo.path(), &dest_dir).unwrap().is_empty());

        fs::write(repo.path().join("intel.lic"), "B2").unwrap();
        let written = install_license_files(repo.path(), &dest_dir).unwrap();
        assert_eq!(written, vec![dest_dir.join("intel.lic")]);
    }

    #[test]
    fn test_easybuild_command_line() {
        let engine = EasyBuildEngine::new().with_config_file(Some(PathBuf::from("/etc/eb.cfg")));
        let cmd = engine.command(Path::new("/recipes/zlib-1.2.11.eb"));

        assert_eq!(cmd.get_program(), "eb");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--robot", "--rpath", "/recipes/zlib-1.2.11.eb"]);
        assert!(cmd
            .get_envs()
            .any(|(k, v)| k == EASYBUILD_CONFIG_ENV && v == Some("/etc/eb.cfg".as_ref())));
    }

    /// A temp dir holding EasyBuild leftovers and a filled build path.
    fn scratch_fixture() -> (TempDir, ScratchDirs) {
        let temp = TempDir::new().unwrap();
        let tmp = temp.path().join("tmp");
        let build = temp.path().join("build");
        fs::create_dir_all(tmp.join("eb-abc123/tmp")).unwrap();
        fs::write(tmp.join("eb-abc123/easybuild.log"), "log").unwrap();
        fs::create_dir_all(tmp.join("other")).unwrap();
        fs::write(tmp.join("eb-file"), "").unwrap();
        fs::create_dir_all(build.join("zlib/1.2.11")).unwrap();
        fs::write(build.join("stray.txt"), "").unwrap();
        let scratch = ScratchDirs::new(&build).with_tmp_dir(&tmp);
        (temp, scratch)
    }

    fn scratch_is_clean(temp: &TempDir) -> bool {
        let tmp = temp.path().join("tmp");
        let build = temp.path().join("build");
        !tmp.join("eb-abc123").exists()
            && tmp.join("other").is_dir()
            && tmp.join("eb-file").exists()
            && build.is_dir()
            && fs::read_dir(&build).unwrap().next().is_none()
    }

    #[test]
    fn test_scratch_clean_removes_engine_dirs_and_empties_buildpath() {
        let (temp, scratch) = scratch_fixture();
        assert_eq!(scratch.clean().unwrap(), 3);
        assert!(scratch_is_clean(&temp));
        assert_eq!(scratch.clean().unwrap(), 0);
    }

    #[test]
    fn test_scratch_clean_tolerates_missing_dirs() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::new(temp.path().join("nope")).with_tmp_dir(temp.path().join("gone"));
        assert_eq!(scratch.clean().unwrap(), 0);
    }

    #[test]
    fn test_scratch_around_cleans_after_success_only() {
        let (temp, scratch) = scratch_fixture();
        let build = temp.path().join("build");

        scratch
            .around(|| {
                assert!(scratch_is_clean(&temp));
                fs::create_dir_all(temp.path().join("tmp/eb-new")).unwrap();
                fs::write(build.join("partial.o"), "").unwrap();
                Ok(())
            })
            .unwrap();
        assert!(scratch_is_clean(&temp));

        let result: Result<()> = scratch.around(|| {
            fs::create_dir_all(temp.path().join("tmp/eb-failed")).unwrap();
            fs::write(temp.path().join("tmp/eb-failed/easybuild.log"), "error").unwrap();
            fs::write(build.join("partial.o"), "").unwrap();
            Err(Error::Build {
                entry: "zlib-1.2.11".to_string(),
                message: "eb exited with status 1".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(temp.path().join("tmp/eb-failed/easybuild.log").exists());
        assert!(build.join("partial.o").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_easybuild_engine_cleans_scratch_around_build() {
        let plan = sample_plan();

        let (temp, scratch) = scratch_fixture();
        let mut engine = EasyBuildEngine::new()
            .with_program("true")
            .with_scratch(scratch.clone());
        engine
            .build(&plan.entries[0], Path::new("zlib-1.2.11.eb"))
            .unwrap();
        assert!(scratch_is_clean(&temp));

        fs::create_dir_all(temp.path().join("tmp/eb-left")).unwrap();
        let mut engine = EasyBuildEngine::new()
            .with_program("false")
            .with_scratch(scratch);
        let err = engine
            .build(&plan.entries[0], Path::new("zlib-1.2.11.eb"))
            .unwrap_err();
        assert!(matches!(err, Error::Build { .. }));
        assert!(!temp.path().join("tmp/eb-left").exists());
    }

    #[test]
    fn test_easybuild_missing_program_is_build_error() {
        let plan = sample_plan();
        let mut engine = EasyBuildEngine::new().with_program("/nonexistent/eb-program");
        let err = engine
            .build(&plan.entries[0], Path::new("zlib-1.2.11.eb"))
            .unwrap_err();
        assert!(matches!(err, Error::Build { entry, .. } if entry == "zlib-1.2.11"));
    }
}
