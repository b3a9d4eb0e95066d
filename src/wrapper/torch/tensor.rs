//! torch.Tensor <-> candle Tensor
//! 依赖:
//! - python: torch, numpy

use std::marker::PhantomData;

use candle_core::{Device, Tensor, WithDType};
use numpy::{Element, PyArray, PyArrayDyn, PyArrayMethods, PyUntypedArrayMethods};
use pyo3::{
    exceptions::PyRuntimeError, types::PyAnyMethods, Bound, IntoPyObject, PyAny, PyErr, PyResult,
    Python,
};

use crate::error::Error;

pub struct TensorWrapper<T>
where
    T: Element + WithDType,
{
    tensor: Tensor,
    _marker: PhantomData<T>,
}

impl<T> TensorWrapper<T>
where
    T: Element + WithDType,
{
    pub fn new<'py>(py_any: &Bound<'py, PyAny>, device: &Device) -> PyResult<Self> {
        let tensor = Self::torch_to_candle(py_any, device)
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;

        Ok(Self {
            tensor,
            _marker: PhantomData,
        })
    }

    pub fn from_tensor(tensor: Tensor) -> Self {
        Self {
            tensor,
            _marker: PhantomData,
        }
    }

    pub fn into_tensor(self) -> Tensor {
        self.tensor
    }

    /// 从 Python torch.Tensor 转为 Rust candle_core::Tensor
    ///
    /// GPU 上的张量先拷贝回 CPU
    fn torch_to_candle<'py>(
        torch_tensor: &Bound<'py, PyAny>,
        device: &Device,
    ) -> Result<Tensor, Error> {
        let np = torch_tensor
            .call_method0("detach")?
            .call_method0("cpu")?
            .call_method0("contiguous")?
            .call_method0("numpy")?;

        let arr = np.downcast::<PyArrayDyn<T>>()?;
        let shape = arr.shape().to_vec();
        let data = arr.to_vec()?;

        let tensor = Tensor::from_vec(data, shape, device)?;
        Ok(tensor)
    }

    /// 转换为 python 的 tensor
    /// ```python,ignore
    /// import torch
    /// tensor = torch.from_numpy(data)
    /// ```
    pub fn to_py_tensor<'py>(self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let data = self.into_pyobject(py)?;

        let torch = py.import("torch")?;
        torch.getattr("from_numpy")?.call1((data,))
    }
}

impl<T> From<Tensor> for TensorWrapper<T>
where
    T: Element + WithDType,
{
    fn from(value: Tensor) -> Self {
        TensorWrapper::from_tensor(value)
    }
}

impl<'py, T> IntoPyObject<'py> for TensorWrapper<T>
where
    T: Element + WithDType,
{
    type Target = PyArrayDyn<T>;
    type Output = Bound<'py, Self::Target>;
    type Error = PyErr;

    fn into_pyobject(self, py: Python<'py>) -> Result<Self::Output, Self::Error> {
        let tensor = self.into_tensor();
        let shape = tensor.dims().to_vec();

        let data = tensor
            .flatten_all()
            .and_then(|t| t.to_vec1::<T>())
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;

        PyArray::from_vec(py, data).reshape(shape)
    }
}

#[cfg(test)]
mod tests {
    use pyo3::types::PyList;

    use super::*;

    #[test]
    #[ignore]
    fn test_round_trip() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let tensor = Tensor::arange(0f32, 24f32, &Device::Cpu)?.reshape((1, 2, 4, 3))?;
            let py_tensor = TensorWrapper::<f32>::from_tensor(tensor.clone()).to_py_tensor(py)?;
            let back = TensorWrapper::<f32>::new(&py_tensor, &Device::Cpu)?.into_tensor();
            assert_eq!(back.dims(), &[1, 2, 4, 3]);
            assert_eq!(
                back.flatten_all()?.to_vec1::<f32>()?,
                tensor.flatten_all()?.to_vec1::<f32>()?
            );
            Ok(())
        })
    }

    #[test]
    #[ignore]
    fn test_new_rejects_list() -> anyhow::Result<()> {
        Python::with_gil(|py| {
            let binding = PyList::empty(py);
            assert!(TensorWrapper::<f32>::new(binding.as_any(), &Device::Cpu).is_err());
        });
        Ok(())
    }
}
