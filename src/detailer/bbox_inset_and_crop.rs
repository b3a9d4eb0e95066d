//! 边界框收缩与裁剪

use candle_core::Device;
use pyo3::{
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyType},
    Bound, IntoPyObject, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_DETAILER,
    detailer::bbox::BoundingBox,
    error::Error,
    wrapper::{
        comfyui::{
            types::{NODE_BBOX, NODE_IMAGE, NODE_INT},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

/// 宿主 BBOX: (x, y, w, h), 或仅包含它的单元素序列
fn parse_bbox(bbox: &Bound<'_, PyAny>) -> Result<(BoundingBox, bool), Error> {
    let nested = bbox.len()? == 1;
    let bbox = if nested { bbox.get_item(0)? } else { bbox.clone() };
    let (x, y, width, height) = bbox.extract::<(usize, usize, usize, usize)>()?;
    Ok((BoundingBox::new(x, y, width, height), nested))
}

/// 收缩边界框, 并从裁剪图中去掉对应的边缘
#[pyclass(subclass)]
pub struct BBoxInsetAndCrop {
    device: Device,
}

impl PromptServer for BBoxInsetAndCrop {}

#[pymethods]
impl BBoxInsetAndCrop {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_IMAGE, NODE_BBOX)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("cropped_image", "inset_bbox")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DETAILER;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Inset a bbox and crop the matching edges from its crop image, removing edge artifacts before uncropping."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("crop_image", (NODE_IMAGE,))?;
                required.set_item("bbox", (NODE_BBOX,))?;
                required.set_item(
                    "inset_pixels",
                    (NODE_INT, {
                        let inset_pixels = PyDict::new(py);
                        inset_pixels.set_item("default", 8)?;
                        inset_pixels.set_item("min", 0)?;
                        inset_pixels.set_item("max", 512)?;
                        inset_pixels.set_item("step", 1)?;
                        inset_pixels
                    }),
                )?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        crop_image: Bound<'py, PyAny>,
        bbox: Bound<'py, PyAny>,
        inset_pixels: usize,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        let results = self.inset_and_crop(py, &crop_image, &bbox, inset_pixels);

        results.map_err(|e| self.raise_error(py, "BBoxInsetAndCrop", e))
    }
}

impl BBoxInsetAndCrop {
    fn inset_and_crop<'py>(
        &self,
        py: Python<'py>,
        crop_image: &Bound<'py, PyAny>,
        bbox: &Bound<'py, PyAny>,
        inset_pixels: usize,
    ) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
        let (bbox, nested) = parse_bbox(bbox)?;
        let image = TensorWrapper::<f32>::new(crop_image, &self.device)?.into_tensor();

        let (cropped, inset) = bbox.inset_and_crop(&image, inset_pixels)?;
        let cropped = TensorWrapper::<f32>::from_tensor(cropped).to_py_tensor(py)?;

        let inset = (inset.x, inset.y, inset.width, inset.height);
        let inset = if nested {
            (inset,).into_pyobject(py)?.into_any()
        } else {
            inset.into_pyobject(py)?.into_any()
        };
        Ok((cropped, inset))
    }
}

#[cfg(test)]
mod tests {
    use pyo3::types::PyList;

    use super::*;

    #[test]
    #[ignore]
    fn test_parse_bbox() -> anyhow::Result<()> {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| -> anyhow::Result<()> {
            let flat = (4usize, 8usize, 32usize, 16usize).into_pyobject(py)?.into_any();
            let (bbox, nested) = parse_bbox(&flat)?;
            assert_eq!(bbox, BoundingBox::new(4, 8, 32, 16));
            assert!(!nested);

            let wrapped = PyList::new(py, [(1usize, 2usize, 3usize, 4usize)])?.into_any();
            let (bbox, nested) = parse_bbox(&wrapped)?;
            assert_eq!(bbox, BoundingBox::new(1, 2, 3, 4));
            assert!(nested);
            Ok(())
        })
    }
}
