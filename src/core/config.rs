//! 配置目录
//!
//! 查找顺序:
//! - 环境变量 `MUDKNIGHT_CONFIG_DIR`
//! - 扩展模块所在目录下的 `config`
//! - 当前工作目录下的 `config`

use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use log::warn;
use pyo3::{types::PyAnyMethods, Python};

/// 配置目录环境变量
pub const CONFIG_DIR_ENV: &str = "MUDKNIGHT_CONFIG_DIR";

/// 扩展模块名称
pub const PACKAGE_NAME: &str = "comfyui_mudknight_utils";

static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// 获取配置目录, 首次调用时解析
pub fn config_dir() -> &'static Path {
    CONFIG_DIR.get_or_init(resolve_config_dir)
}

fn resolve_config_dir() -> PathBuf {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }

    if let Some(dir) = package_dir() {
        return dir.join("config");
    }

    let cwd = env::current_dir().unwrap_or_default();
    warn!(
        "unable to locate the package directory, using {}",
        cwd.join("config").display()
    );
    cwd.join("config")
}

/// 通过 sys.modules 查找扩展模块的 __file__
fn package_dir() -> Option<PathBuf> {
    Python::with_gil(|py| {
        let modules = py.import("sys").ok()?.getattr("modules").ok()?;
        let nested = format!("{PACKAGE_NAME}.{PACKAGE_NAME}");
        let module = [nested.as_str(), PACKAGE_NAME]
            .iter()
            .find_map(|name| modules.get_item(*name).ok())?;
        let file = module.getattr("__file__").ok()?.extract::<String>().ok()?;
        Path::new(&file).parent().map(Path::to_path_buf)
    })
}
