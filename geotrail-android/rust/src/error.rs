use geotrail_rs::GeotrailError;
use jni::JNIEnv;
use thiserror::Error;

/// Errors crossing the JNI boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error(transparent)]
    Pipeline(#[from] GeotrailError),

    #[error("Bridge not initialised; call nativeInit first")]
    NotInitialised,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("JNI error: {0}")]
    JniError(String),
}

/// Result type for JNI operations
pub type JResult<T> = Result<T, BridgeError>;

/// Java exception class for an error
pub fn exception_class(error: &BridgeError) -> &'static str {
    match error {
        BridgeError::Pipeline(GeotrailError::AlreadyRunning)
        | BridgeError::Pipeline(GeotrailError::NotRunning)
        | BridgeError::NotInitialised => "java/lang/IllegalStateException",
        BridgeError::Pipeline(GeotrailError::InvalidConfig(_))
        | BridgeError::InvalidParameters(_) => "java/lang/IllegalArgumentException",
        BridgeError::Pipeline(GeotrailError::Storage(_))
        | BridgeError::Pipeline(GeotrailError::MissingFile(_))
        | BridgeError::Pipeline(GeotrailError::Upload(_)) => "java/io/IOException",
        BridgeError::Pipeline(_) | BridgeError::JniError(_) => "java/lang/RuntimeException",
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &BridgeError) -> JResult<()> {
    let message = error.to_string();
    env.throw_new(exception_class(error), message)
        .map_err(|_| BridgeError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_mapping() {
        assert_eq!(
            exception_class(&GeotrailError::AlreadyRunning.into()),
            "java/lang/IllegalStateException"
        );
        assert_eq!(
            exception_class(&GeotrailError::InvalidConfig("scale".into()).into()),
            "java/lang/IllegalArgumentException"
        );
        assert_eq!(
            exception_class(&GeotrailError::Storage("disk full".into()).into()),
            "java/io/IOException"
        );
        assert_eq!(
            exception_class(&GeotrailError::Codec("bad".into()).into()),
            "java/lang/RuntimeException"
        );
        assert_eq!(
            exception_class(&BridgeError::NotInitialised),
            "java/lang/IllegalStateException"
        );
    }
}
