//! 文件夹路径
//!
//! 模型目录以宿主的 `folder_paths` 为准 (含 extra_model_paths.yaml),
//! 放大模型列表在这些目录下递归扫描.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use pyo3::{types::PyAnyMethods, Python};
use walkdir::WalkDir;

use crate::error::Error;

// 放大模型文件扩展名
lazy_static! {
    static ref UPSCALE_MODEL_EXTENSIONS: HashSet<&'static str> = {
        let mut set = HashSet::new();
        set.insert("pth");
        set.insert("pt");
        set.insert("safetensors");
        set
    };
}

/// 未选择模型
pub const NONE_OPTION: &str = "none";

/// folder_paths.get_filename_list
pub fn get_filename_list(py: Python<'_>, folder_name: &str) -> Result<Vec<String>, Error> {
    let list = py
        .import("folder_paths")?
        .call_method1("get_filename_list", (folder_name,))?
        .extract::<Vec<String>>()?;
    Ok(list)
}

/// folder_paths.get_full_path_or_raise
pub fn get_full_path(py: Python<'_>, folder_name: &str, filename: &str) -> Result<PathBuf, Error> {
    let path = py
        .import("folder_paths")?
        .call_method1("get_full_path_or_raise", (folder_name, filename))?
        .extract::<String>()?;
    Ok(PathBuf::from(path))
}

/// folder_paths.get_folder_paths
pub fn get_folder_paths(py: Python<'_>, folder_name: &str) -> Result<Vec<PathBuf>, Error> {
    let paths = py
        .import("folder_paths")?
        .call_method1("get_folder_paths", (folder_name,))?
        .extract::<Vec<String>>()?;
    Ok(paths.into_iter().map(PathBuf::from).collect())
}

/// 放大模型列表, 首项为 "none"
pub fn get_upscale_model_list(py: Python<'_>) -> Result<Vec<String>, Error> {
    let dirs = get_folder_paths(py, "upscale_models")?;
    let mut models = vec![NONE_OPTION.to_string()];
    models.extend(scan_model_files(&dirs));
    Ok(models)
}

/// 递归扫描模型文件, 返回相对路径 (统一使用 `/`), 去重并排序
pub fn scan_model_files(dirs: &[PathBuf]) -> Vec<String> {
    let mut files = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if !has_model_extension(entry.path()) {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(dir) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(name);
            }
        }
    }

    files.sort();
    files.dedup();
    files
}

fn has_model_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| UPSCALE_MODEL_EXTENSIONS.contains(ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_scan_model_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("esrgan"))?;
        fs::write(dir.path().join("4x-UltraSharp.pth"), b"")?;
        fs::write(dir.path().join("esrgan/RealESRGAN_x2.SAFETENSORS"), b"")?;
        fs::write(dir.path().join("readme.txt"), b"")?;

        let files = scan_model_files(&[dir.path().to_path_buf(), dir.path().join("missing")]);
        assert_eq!(
            files,
            vec![
                "4x-UltraSharp.pth".to_string(),
                "esrgan/RealESRGAN_x2.SAFETENSORS".to_string()
            ]
        );
        Ok(())
    }
}
