//! Default values for stack-builder configuration.
//!
//! This module provides centralized file names, directories, branch and
//! remote names used across commands, ensuring consistency and avoiding
//! duplication.

use std::path::PathBuf;

/// File name of the stack-builder settings file.
pub const STACK_BUILDER_CONFIG_FILE: &str = "config_stackbuilder.cfg";

/// File name of the EasyBuild configuration file.
pub const EASYBUILD_CONFIG_FILE: &str = "config.cfg";

/// Environment variable naming an explicit stack-builder settings file.
pub const STACK_BUILDER_CONFIG_ENV: &str = "STACKBUILDER_CONFIGFILES";

/// Environment variable naming the EasyBuild configuration file.
pub const EASYBUILD_CONFIG_ENV: &str = "EASYBUILD_CONFIGFILES";

/// Package list file shipped in the stack-definition repository.
pub const PACKAGE_LIST_FILE: &str = "sib_stack_package_list.txt";

/// Local override of the package list, searched before `PACKAGE_LIST_FILE`.
pub const PACKAGE_LIST_OVERRIDE_FILE: &str = "package_list.txt";

/// Main branch of the recipe repository.
pub const RECIPES_MAIN_BRANCH: &str = "develop";

/// Main branch of the stack-definition repository.
pub const STACK_MAIN_BRANCH: &str = "main";

/// Remote holding every node's branches.
pub const ORIGIN_REMOTE: &str = "origin";

/// Remote name used for the third-party upstream recipe repository.
pub const UPSTREAM_REMOTE: &str = "eb-source";

/// URL of the third-party upstream recipe repository.
pub const UPSTREAM_URL: &str = "https://github.com/easybuilders/easybuild-easyconfigs";

/// Extension of recipe files.
pub const RECIPE_EXTENSION: &str = ".eb";

/// Extension of license files copied out of the stack-definition repository.
pub const LICENSE_EXTENSION: &str = ".lic";

/// Program invoked to build a recipe.
pub const BUILD_ENGINE_PROGRAM: &str = "eb";

/// Directories EasyBuild creates in the system temp directory.
pub const ENGINE_TMP_PATTERN: &str = "eb-*";

/// Returns the directory where EasyBuild and stack-builder configuration
/// files are looked up by default: `~/.config/easybuild`.
///
/// Falls back to `.config/easybuild` relative to the current directory when
/// the home directory cannot be determined.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("easybuild")
}

/// Returns the directory where EasyBuild looks for license files: `~/licenses`.
pub fn default_license_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("licenses")
}
