//! 角色编辑器
//!
//! 角色列表读写与参考图处理, HTTP 路由由宿主侧注册后调用这里的函数.
//! 路由中的角色名为 base64 编码, 图片文件名为 urlsafe base64 编码.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine,
};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use log::info;
use pyo3::{
    pyfunction,
    types::{PyModule, PyModuleMethods},
    wrap_pyfunction, Bound, PyAny, PyResult, Python,
};
use pythonize::{depythonize, pythonize};
use serde_json::{Map, Value};

use crate::{
    error::Error,
    preset::{store::PresetStore, types::PresetKind},
};

/// 参考图边长
pub const IMAGE_SIZE: u32 = 256;
/// JPEG 质量
pub const JPEG_QUALITY: u8 = 85;

/// 路由参数中的角色名
pub fn decode_name(encoded: &str) -> Result<String, Error> {
    Ok(String::from_utf8(STANDARD.decode(encoded)?)?)
}

/// 去掉 data URL 前缀并解码
pub fn decode_image_data(data: &str) -> Result<Vec<u8>, Error> {
    let data = match data.strip_prefix("data:image") {
        Some(rest) => rest.split_once(',').map(|(_, b64)| b64).unwrap_or_default(),
        None => data,
    };
    Ok(STANDARD.decode(data.trim())?)
}

/// 居中裁剪为正方形后缩放
pub fn square_thumbnail(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let side = width.min(height);
    let cropped = image.crop_imm((width - side) / 2, (height - side) / 2, side, side);
    DynamicImage::ImageRgb8(cropped.to_rgb8()).resize_exact(size, size, FilterType::Lanczos3)
}

/// 角色数据与参考图
#[derive(Debug, Clone)]
pub struct CharacterEditor {
    store: PresetStore,
}

impl Default for CharacterEditor {
    fn default() -> Self {
        Self::new(PresetStore::default())
    }
}

impl CharacterEditor {
    pub fn new(store: PresetStore) -> Self {
        Self { store }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.store.dir().join("character_images")
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        let file_name = format!("{}.jpg", URL_SAFE.encode(name.as_bytes()));
        self.images_dir().join(file_name)
    }

    pub fn characters(&self) -> Result<Map<String, Value>, Error> {
        self.store.read(PresetKind::Characters)
    }

    pub fn replace_characters(&self, characters: &Map<String, Value>) -> Result<(), Error> {
        self.store.save(PresetKind::Characters, characters)
    }

    /// 删除角色及其参考图, 角色不存在时返回 false
    pub fn delete_character(&self, name: &str) -> Result<bool, Error> {
        let mut characters = self.characters()?;
        if characters.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.replace_characters(&characters)?;
        self.delete_image(name)?;
        Ok(true)
    }

    /// 已存在的参考图路径
    pub fn find_image(&self, name: &str) -> Option<PathBuf> {
        let path = self.image_path(name);
        path.exists().then_some(path)
    }

    /// 保存参考图, 输入为 base64 或 data URL
    pub fn save_image(&self, name: &str, data: &str) -> Result<PathBuf, Error> {
        let bytes = decode_image_data(data)?;
        let image = image::load_from_memory(&bytes)?;
        let thumbnail = square_thumbnail(&image, IMAGE_SIZE);

        fs::create_dir_all(self.images_dir())?;
        let path = self.image_path(name);
        let writer = BufWriter::new(File::create(&path)?);
        JpegEncoder::new_with_quality(writer, JPEG_QUALITY).encode_image(&thumbnail.to_rgb8())?;
        info!("saved character image: {}", path.display());
        Ok(path)
    }

    pub fn delete_image(&self, name: &str) -> Result<bool, Error> {
        match self.find_image(name) {
            Some(path) => {
                fs::remove_file(path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// 全部角色
#[pyfunction]
fn list_characters(py: Python<'_>) -> PyResult<Bound<'_, PyAny>> {
    let characters = CharacterEditor::default().characters()?;
    Ok(pythonize(py, &characters)?)
}

/// 以 data 覆盖全部角色
#[pyfunction]
fn save_characters(data: &Bound<'_, PyAny>) -> PyResult<()> {
    let characters: Map<String, Value> = depythonize(data)?;
    CharacterEditor::default().replace_characters(&characters)?;
    Ok(())
}

#[pyfunction]
fn delete_character(name: &str) -> PyResult<bool> {
    Ok(CharacterEditor::default().delete_character(name)?)
}

/// 参考图路径, 不存在时为 None
#[pyfunction]
fn character_image_path(encoded_name: &str) -> PyResult<Option<String>> {
    let name = decode_name(encoded_name)?;
    Ok(CharacterEditor::default()
        .find_image(&name)
        .map(|path| path_string(&path)))
}

#[pyfunction]
fn upload_character_image(encoded_name: &str, image: &str) -> PyResult<String> {
    let name = decode_name(encoded_name)?;
    let path = CharacterEditor::default().save_image(&name, image)?;
    Ok(path_string(&path))
}

#[pyfunction]
fn delete_character_image(encoded_name: &str) -> PyResult<bool> {
    let name = decode_name(encoded_name)?;
    Ok(CharacterEditor::default().delete_image(&name)?)
}

/// character_editor 模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "character_editor")?;
    submodule.add_function(wrap_pyfunction!(list_characters, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(save_characters, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(delete_character, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(character_image_path, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(upload_character_image, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(delete_character_image, &submodule)?)?;
    Ok(submodule)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::json;

    use super::*;

    fn png_base64(width: u32, height: u32) -> anyhow::Result<String> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image).write_to(&mut buffer, ImageFormat::Png)?;
        Ok(STANDARD.encode(buffer.into_inner()))
    }

    #[test]
    fn test_decode_name_and_image_path() -> anyhow::Result<()> {
        let encoded = STANDARD.encode("Aqua (Konosuba)");
        assert_eq!(decode_name(&encoded)?, "Aqua (Konosuba)");

        let editor = CharacterEditor::new(PresetStore::new("/tmp/config"));
        let path = editor.image_path("a/b?");
        assert_eq!(
            path,
            Path::new("/tmp/config/character_images").join(format!("{}.jpg", URL_SAFE.encode("a/b?")))
        );
        assert!(!path_string(&path).contains("a/b?"));
        Ok(())
    }

    #[test]
    fn test_square_thumbnail() -> anyhow::Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(300, 120));
        let thumbnail = square_thumbnail(&image, IMAGE_SIZE);
        assert_eq!((thumbnail.width(), thumbnail.height()), (256, 256));
        Ok(())
    }

    #[test]
    fn test_save_and_delete_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let editor = CharacterEditor::new(PresetStore::new(dir.path()));

        let data = format!("data:image/png;base64,{}", png_base64(64, 32)?);
        let path = editor.save_image("alice", &data)?;
        let saved = image::open(&path)?;
        assert_eq!((saved.width(), saved.height()), (256, 256));
        assert_eq!(editor.find_image("alice"), Some(path));

        assert!(editor.delete_image("alice")?);
        assert!(!editor.delete_image("alice")?);
        assert!(editor.save_image("bob", "not base64!").is_err());
        Ok(())
    }

    #[test]
    fn test_delete_character() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let editor = CharacterEditor::new(PresetStore::new(dir.path()));

        let Value::Object(characters) = json!({
            "alice": {"character": "1girl"},
            "bob": "1boy"
        }) else {
            anyhow::bail!("expected object");
        };
        editor.replace_characters(&characters)?;
        editor.save_image("alice", &png_base64(8, 8)?)?;

        assert!(editor.delete_character("alice")?);
        assert!(!editor.delete_character("alice")?);
        assert!(editor.find_image("alice").is_none());

        let remaining = editor.characters()?;
        assert_eq!(remaining.keys().collect::<Vec<_>>(), ["bob"]);
        Ok(())
    }
}
