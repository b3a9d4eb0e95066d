//! 错误处理

#[allow(unused)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // 标准库错误处理
    #[error("io error, {0}")]
    Io(std::io::Error),
    #[error("system time error, {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
    #[error("lock error, {0}")]
    LockError(String),
    #[error("strum error, {0}")]
    ParseEnumString(String),

    #[error("serde json error, {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("base64 decode error, {0}")]
    Base64DecodeError(#[from] base64::DecodeError),
    #[error("utf8 error, {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    #[error("the list is empty")]
    ListEmpty,

    #[error("py error, {0}")]
    PyErr(#[from] pyo3::PyErr),
    #[error("pythonize error, {0}")]
    PythonizeError(#[from] pythonize::PythonizeError),
    #[error("py downcast error, {0}")]
    PyDowncastError(String),

    #[error("tensor error, {0}")]
    TensorErr(#[from] candle_core::Error),
    #[error("invalid tensor shape, {0}")]
    InvalidTensorShape(String),
    #[error("numpy error, {0}")]
    NotContiguousError(#[from] numpy::NotContiguousError),

    #[error("image error, {0}")]
    ImageError(#[from] image::ImageError),

    #[error("invalid parameter, {0}")]
    InvalidParameter(String),

    // 配置错误, 在执行任何处理前抛出
    #[error("required node '{0}' is not registered, install the extension that provides it")]
    MissingNode(String),
    #[error("full_pipe must contain '{0}'")]
    MissingPipeField(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::LockError(e.to_string())
    }
}

impl<'a, 'py> From<pyo3::DowncastError<'a, 'py>> for Error {
    fn from(e: pyo3::DowncastError<'a, 'py>) -> Self {
        Error::PyDowncastError(e.to_string())
    }
}

impl From<Error> for pyo3::PyErr {
    fn from(e: Error) -> Self {
        match e {
            Error::PyErr(e) => e,
            e => pyo3::exceptions::PyRuntimeError::new_err(e.to_string()),
        }
    }
}
