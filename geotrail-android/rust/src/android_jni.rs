use crate::error::{throw_java_exception, BridgeError, JResult};
use crate::sensor_receiver::{CameraSample, LocationSample};
use crate::session::AndroidSession;
use geotrail_rs::{GeotrailError, SessionState};
use jni::objects::{JByteArray, JClass, JString};
use jni::sys::{jboolean, jdouble, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use log::info;
use std::sync::{Arc, Mutex};

// Global bridge state - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_SESSION: Arc<Mutex<Option<Arc<AndroidSession>>>> = Arc::new(Mutex::new(None));
}

/// Get the session created by nativeInit
fn get_session() -> JResult<Arc<AndroidSession>> {
    let session_guard = GLOBAL_SESSION.lock().map_err(|_| {
        BridgeError::JniError("Failed to acquire global session lock".to_string())
    })?;
    session_guard.as_ref().map(Arc::clone).ok_or(BridgeError::NotInitialised)
}

/// Read a Java string; null maps to None
fn optional_string(env: &mut JNIEnv, value: &JString) -> JResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    env.get_string(value)
        .map(|s| Some(s.into()))
        .map_err(|e| BridgeError::JniError(format!("Failed to read Java string: {}", e)))
}

fn required_string(env: &mut JNIEnv, value: &JString, name: &str) -> JResult<String> {
    optional_string(env, value)?
        .ok_or_else(|| BridgeError::InvalidParameters(format!("{} must not be null", name)))
}

fn new_java_string(env: &mut JNIEnv, value: JResult<String>) -> jstring {
    match value {
        Ok(s) => match env.new_string(&s) {
            Ok(jstr) => jstr.into_raw(),
            Err(_) => {
                let _ = throw_java_exception(
                    env,
                    &BridgeError::JniError("Failed to create Java string".to_string()),
                );
                std::ptr::null_mut()
            }
        },
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            std::ptr::null_mut()
        }
    }
}

/// Map a unit result to the 0 / -1 convention, throwing on error
fn status_code(env: &mut JNIEnv, result: JResult<()>) -> jint {
    match result {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            -1
        }
    }
}

/// JNI: Create the bridge; photos are copied to `outboxDir` for upload
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_nativeInit(
    mut env: JNIEnv,
    _class: JClass,
    outbox_dir: JString,
) -> jint {
    let result = native_init_impl(&mut env, &outbox_dir);
    status_code(&mut env, result)
}

fn native_init_impl(env: &mut JNIEnv, outbox_dir: &JString) -> JResult<()> {
    // stderr is captured by logcat
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let outbox_dir = required_string(env, outbox_dir, "outboxDir")?;
    let mut session_guard = GLOBAL_SESSION.lock().map_err(|_| {
        BridgeError::JniError("Failed to acquire global session lock".to_string())
    })?;
    if let Some(existing) = session_guard.as_ref() {
        if existing.state() == SessionState::Running {
            return Err(GeotrailError::AlreadyRunning.into());
        }
    }
    *session_guard = Some(Arc::new(AndroidSession::new(&outbox_dir)));
    info!("[jni] initialised, outbox {}", outbox_dir);
    Ok(())
}

/// JNI: Start a capture session from a JSON config
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_startSession(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
) -> jint {
    let result = start_session_impl(&mut env, &config_json);
    status_code(&mut env, result)
}

fn start_session_impl(env: &mut JNIEnv, config_json: &JString) -> JResult<()> {
    let config_json = required_string(env, config_json, "configJson")?;
    get_session()?.start(&config_json)
}

/// JNI: Stop the current session; blocks until both workers have quiesced
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_stopSession(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_session().and_then(|session| session.stop());
    status_code(&mut env, result)
}

/// JNI: Push a location fix
/// Parameters: provider (0 gps, 1 network, 2 passive), latitude, longitude,
/// altitude (m), accuracy (m), speed (m/s), time (ms since epoch)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_pushFix(
    mut env: JNIEnv,
    _class: JClass,
    provider: jint,
    latitude: jdouble,
    longitude: jdouble,
    altitude: jdouble,
    accuracy: jdouble,
    speed: jdouble,
    time_ms: jlong,
) -> jint {
    let sample = LocationSample {
        provider,
        latitude,
        longitude,
        altitude,
        accuracy,
        speed,
        time_ms,
    };
    let result = push_fix_impl(sample);
    status_code(&mut env, result)
}

fn push_fix_impl(sample: LocationSample) -> JResult<()> {
    let session = get_session()?;
    session.push_fix(sample.into_fix()?);
    Ok(())
}

/// JNI: Provider enabled/disabled callback
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_setProviderAvailable(
    mut env: JNIEnv,
    _class: JClass,
    provider: jint,
    available: jboolean,
) -> jint {
    let result =
        get_session().and_then(|s| s.set_provider_available(provider, available != JNI_FALSE));
    status_code(&mut env, result)
}

/// JNI: Raw orientation sensor degrees (negative = unknown)
/// Returns: quantised orientation (0/90/180/270), -1 on error
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_setDeviceOrientation(
    mut env: JNIEnv,
    _class: JClass,
    degrees: jint,
) -> jint {
    match get_session() {
        Ok(session) => session.set_device_orientation(degrees).degrees() as jint,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Publish camera parameters; null strings and focal length <= 0 mean unknown
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_setCameraParams(
    mut env: JNIEnv,
    _class: JClass,
    flash_mode: JString,
    focal_length_mm: jdouble,
    white_balance: JString,
    aperture: JString,
) -> jint {
    let result = set_camera_params_impl(
        &mut env,
        &flash_mode,
        focal_length_mm,
        &white_balance,
        &aperture,
    );
    status_code(&mut env, result)
}

fn set_camera_params_impl(
    env: &mut JNIEnv,
    flash_mode: &JString,
    focal_length_mm: f64,
    white_balance: &JString,
    aperture: &JString,
) -> JResult<()> {
    let sample = CameraSample {
        flash_mode: optional_string(env, flash_mode)?,
        focal_length_mm,
        white_balance: optional_string(env, white_balance)?,
        aperture: optional_string(env, aperture)?,
    };
    get_session()?.set_camera_params(sample.into_params());
    Ok(())
}

/// JNI: Id of the capture the pipeline is waiting for
/// Returns: request id, or -1 when nothing is pending
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_pollCaptureRequest(
    mut env: JNIEnv,
    _class: JClass,
) -> jlong {
    match get_session() {
        Ok(session) => session
            .camera()
            .pending_request()
            .map(|id| id as jlong)
            .unwrap_or(-1),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Answer capture request `id` with JPEG bytes, or with an error message
/// when `jpeg` is null
/// Returns: true if the request was still pending
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_deliverCapture(
    mut env: JNIEnv,
    _class: JClass,
    request_id: jlong,
    jpeg: JByteArray,
    error: JString,
) -> jboolean {
    match deliver_capture_impl(&mut env, request_id, &jpeg, &error) {
        Ok(true) => JNI_TRUE,
        Ok(false) => JNI_FALSE,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            JNI_FALSE
        }
    }
}

fn deliver_capture_impl(
    env: &mut JNIEnv,
    request_id: i64,
    jpeg: &JByteArray,
    error: &JString,
) -> JResult<bool> {
    let session = get_session()?;
    let id = u64::try_from(request_id)
        .map_err(|_| BridgeError::InvalidParameters(format!("request id {}", request_id)))?;

    let frame = if jpeg.is_null() {
        let message = optional_string(env, error)?.unwrap_or_else(|| "camera error".to_string());
        Err(GeotrailError::Capture(message))
    } else {
        let bytes = env
            .convert_byte_array(jpeg)
            .map_err(|e| BridgeError::JniError(format!("Failed to read byte[]: {}", e)))?;
        Ok(bytes)
    };
    Ok(session.camera().deliver(id, frame))
}

/// JNI: Get current session state as string
/// Returns: "IDLE", "RUNNING", "STOPPING" or "STOPPED" as jstring
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_getSessionState(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let state = get_session().map(|s| s.state().as_str().to_ascii_uppercase());
    new_java_string(&mut env, state)
}

/// JNI: Live status (counters, last saved photo, best fix) as JSON
/// Returns: JSON string or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_geotrail_JniBinding_getStatusJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let json = get_session().and_then(|s| s.status_json());
    new_java_string(&mut env, json)
}
