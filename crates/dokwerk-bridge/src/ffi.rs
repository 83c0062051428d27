// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// C ABI surface.
//
// Engines are opaque integer handles in a process-wide table, so destroying
// an engine twice, or using one after destruction, is an ordinary failure
// rather than a dangling pointer. Document handles come from the same
// process-wide allocator, which lets every document call route to its owning
// engine without the host passing the engine along.
//
// Every entry point runs inside `catch_unwind`. Failures are reported through
// the return value (0, false, null, empty JSON) plus the calling thread's
// last-error slot.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char};
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::{AnnotationId, AnnotationType, DocumentHandle, EngineConfig, Rect};
use dokwerk_document::HandleTable;
use dokwerk_engine::Engine;
use dokwerk_plugin::PluginInput;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::marshal;
use crate::status::{self, DokwerkStatus};

// -- Process-wide state -----------------------------------------------------------

#[derive(Clone)]
struct EngineSlot {
    engine: Arc<Engine>,
    runtime: Arc<EngineRuntime>,
}

/// Runtime that shuts down in the background when its last holder lets go,
/// so a boundary call finishing after `dokwerk_engine_destroy` never waits on
/// abandoned plugin work.
struct EngineRuntime(ManuallyDrop<Runtime>);

impl Deref for EngineRuntime {
    type Target = Runtime;

    fn deref(&self) -> &Runtime {
        &self.0
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        // SAFETY: the runtime is taken exactly once, here, and never touched again.
        let runtime = unsafe { ManuallyDrop::take(&mut self.0) };
        runtime.shutdown_background();
    }
}

static ENGINES: LazyLock<HandleTable<EngineSlot>> = LazyLock::new(HandleTable::new);

/// Document handle -> owning engine handle.
static DOCUMENT_ROUTES: LazyLock<RwLock<HashMap<u64, u64>>> = LazyLock::new(Default::default);

const VERSION: &CStr = match CStr::from_bytes_with_nul(concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes()) {
    Ok(version) => version,
    Err(_) => c"0.0.0",
};

fn engine_slot(engine: u64) -> Result<EngineSlot> {
    ENGINES.get(engine)
}

fn route(document: u64) -> Result<(EngineSlot, DocumentHandle)> {
    let owner = DOCUMENT_ROUTES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&document)
        .copied()
        .ok_or(DokwerkError::HandleNotFound(document))?;
    let slot = engine_slot(owner).map_err(|_| DokwerkError::HandleNotFound(document))?;
    Ok((slot, DocumentHandle(document)))
}

fn build_engine(config: EngineConfig) -> Result<u64> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("dokwerk-worker")
        .enable_all()
        .build()?;
    let engine = Engine::new(config);
    engine.register_builtin_plugins()?;
    let report = engine.initialize_plugins();
    for (name, reason) in &report.failed {
        warn!(plugin = %name, %reason, "Built-in plugin failed to initialise");
    }

    let handle = ENGINES.insert(EngineSlot {
        engine: Arc::new(engine),
        runtime: Arc::new(EngineRuntime(ManuallyDrop::new(runtime))),
    });
    info!(engine = handle, plugins = report.ready.len(), "Engine created");
    Ok(handle)
}

/// Make `handle` reachable from document calls. Liveness is checked under the
/// routes lock, which `dokwerk_engine_destroy` takes after removing the engine,
/// so a document opened while its engine is being destroyed is disposed
/// rather than left behind with a dead route.
fn publish_route(engine: u64, slot: &EngineSlot, handle: DocumentHandle) -> Result<u64> {
    let mut routes = DOCUMENT_ROUTES.write().unwrap_or_else(PoisonError::into_inner);
    if !ENGINES.contains(engine) {
        drop(routes);
        slot.engine.dispose(handle);
        debug!(engine, %handle, "Engine destroyed during open; document dropped");
        return Err(DokwerkError::HandleNotFound(engine));
    }
    routes.insert(handle.raw(), engine);
    Ok(handle.raw())
}

/// Run one boundary call: contain panics, translate errors, maintain the
/// last-error slot.
fn guard<T>(operation: &str, fallback: impl FnOnce() -> T, body: impl FnOnce() -> Result<T>) -> T {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => {
            status::clear_error();
            value
        }
        Ok(Err(err)) => {
            // Stale handles are expected from racing host cleanup.
            if err.is_stale_handle() {
                debug!(operation, %err, "Boundary call on a stale handle");
            } else {
                warn!(operation, %err, "Boundary call failed");
            }
            status::record_error(&err);
            fallback()
        }
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            error!(operation, %detail, "Panic caught at the boundary");
            status::set_error(
                DokwerkStatus::InternalError,
                format!("internal_error: {operation} panicked: {detail}"),
            );
            fallback()
        }
    }
}

fn empty_c_string() -> *mut c_char {
    CString::default().into_raw()
}

/// Library-owned copy of a static JSON literal.
fn json_literal(literal: &CStr) -> *mut c_char {
    literal.to_owned().into_raw()
}

// -- Library --------------------------------------------------------------------

/// Library version, e.g. `"0.3.0"`. Static: do not free.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_version() -> *const c_char {
    VERSION.as_ptr()
}

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `info`).
/// Returns false if a subscriber was already installed.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_init_logging() -> bool {
    panic::catch_unwind(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .try_init()
            .is_ok()
    })
    .unwrap_or(false)
}

/// Status of the last failed call on this thread; `Ok` after a success.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_last_error_code() -> DokwerkStatus {
    status::last_status()
}

/// Message of the last failed call on this thread, or null. Caller frees with
/// `dokwerk_string_free`.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_last_error_message() -> *mut c_char {
    status::last_message()
        .and_then(|message| marshal::into_c_string(message).ok())
        .unwrap_or(ptr::null_mut())
}

/// Release a string returned by this library. Null is ignored.
///
/// # Safety
/// `text` must be null or a string returned by a `dokwerk_*` function that has
/// not been freed yet. Never pass `dokwerk_version()`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_string_free(text: *mut c_char) {
    // SAFETY: forwarded caller contract.
    unsafe { marshal::free_c_string(text) }
}

// -- Engine lifetime ---------------------------------------------------------------

/// Create an engine with default configuration and the built-in plugins.
/// Returns 0 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_engine_create() -> u64 {
    guard("engine_create", || 0, || build_engine(EngineConfig::default()))
}

/// Create an engine from a JSON `EngineConfig`. Null means defaults.
/// Returns 0 on failure.
///
/// # Safety
/// `config_json` must be null or a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_engine_create_with_config(config_json: *const c_char) -> u64 {
    guard("engine_create_with_config", || 0, || {
        // SAFETY: caller contract.
        let config = match unsafe { marshal::read_optional_str(config_json, "config_json") }? {
            Some(json) => EngineConfig::from_json(json)?,
            None => EngineConfig::default(),
        };
        build_engine(config)
    })
}

/// Destroy an engine, disposing its documents and plugins. Idempotent.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_engine_destroy(engine: u64) {
    guard("engine_destroy", || (), || {
        let Ok(slot) = ENGINES.remove(engine) else {
            debug!(engine, "Destroy of unknown engine ignored");
            return Ok(());
        };
        DOCUMENT_ROUTES
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, owner| *owner != engine);
        slot.engine.shutdown();
        info!(engine, "Engine destroyed");
        Ok(())
    })
}

/// JSON array of plugin summaries. `"[]"` on failure. Caller frees.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_list_plugins(engine: u64) -> *mut c_char {
    guard("list_plugins", || json_literal(c"[]"), || {
        let slot = engine_slot(engine)?;
        marshal::into_c_string(serde_json::to_string(&slot.engine.plugins())?)
    })
}

// -- Documents -----------------------------------------------------------------------

/// Open `len` bytes at `data` as a document of `format` (tag, extension or
/// MIME type). The bytes are copied. Returns the document handle, 0 on
/// failure.
///
/// # Safety
/// `data` must point to `len` readable bytes and `format` to a NUL-terminated
/// string, both valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_process_document(
    engine: u64,
    data: *const u8,
    len: usize,
    format: *const c_char,
) -> u64 {
    guard("process_document", || 0, || {
        // SAFETY: caller contract.
        let bytes = unsafe { marshal::read_bytes(data, len) }?;
        // SAFETY: caller contract.
        let format = marshal::decode_format(unsafe { marshal::read_str(format, "format") }?)?;
        let slot = engine_slot(engine)?;
        let handle = slot.engine.open(bytes.to_vec(), format)?;
        publish_route(engine, &slot, handle)
    })
}

/// Open the file at `path` on `engine`, inferring the format from its
/// extension. Returns the document handle, or 0 on failure.
///
/// # Safety
/// `path` must be a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_open_file(engine: u64, path: *const c_char) -> u64 {
    guard("open_file", || 0, || {
        // SAFETY: caller contract.
        let path = unsafe { marshal::read_str(path, "path") }?;
        let slot = engine_slot(engine)?;
        let handle = slot.runtime.block_on(slot.engine.open_file(path))?;
        publish_route(engine, &slot, handle)
    })
}

/// Plain text of the document; empty when absent or on failure. Caller frees.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_get_document_text(document: u64) -> *mut c_char {
    guard("get_document_text", empty_c_string, || {
        let (slot, handle) = route(document)?;
        let text = slot.engine.text(handle)?.unwrap_or_default();
        marshal::into_c_string(text)
    })
}

/// Metadata as a JSON object; `"{}"` on failure. Caller frees.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_get_document_metadata(document: u64) -> *mut c_char {
    guard("get_document_metadata", || json_literal(c"{}"), || {
        let (slot, handle) = route(document)?;
        marshal::into_c_string(marshal::encode_metadata(&slot.engine.metadata(handle)?)?)
    })
}

/// Save the document to `path`. Returns false on failure.
///
/// # Safety
/// `path` must be a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_save_document(document: u64, path: *const c_char) -> bool {
    guard("save_document", || false, || {
        // SAFETY: caller contract.
        let path = unsafe { marshal::read_str(path, "path") }?;
        let (slot, handle) = route(document)?;
        slot.engine.save(handle, path)?;
        Ok(true)
    })
}

/// Release a document. Idempotent.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_cleanup_document(document: u64) {
    guard("cleanup_document", || (), || {
        let owner = DOCUMENT_ROUTES
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&document);
        if let Some(slot) = owner.and_then(|engine| engine_slot(engine).ok()) {
            slot.engine.dispose(DocumentHandle(document));
        }
        Ok(())
    })
}

// -- Annotations -----------------------------------------------------------------------

/// Add a note annotation on page 1. Returns false on failure.
///
/// # Safety
/// `content` must be a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_add_annotation(
    document: u64,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    content: *const c_char,
) -> bool {
    guard("add_annotation", || false, || {
        // SAFETY: caller contract.
        let content = unsafe { marshal::read_str(content, "content") }?;
        let (slot, handle) = route(document)?;
        slot.engine
            .annotate(handle, 1, Rect::new(x, y, width, height), content, AnnotationType::Note)?;
        Ok(true)
    })
}

/// Add an annotation of type `kind` (0 = text ... 7 = link) on `page`.
/// Returns the new annotation id, or null on failure. Caller frees.
///
/// # Safety
/// `content` must be a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_annotate(
    document: u64,
    page: u32,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    content: *const c_char,
    kind: i32,
) -> *mut c_char {
    guard("annotate", || ptr::null_mut(), || {
        // SAFETY: caller contract.
        let content = unsafe { marshal::read_str(content, "content") }?;
        let kind = marshal::decode_annotation_type(kind)?;
        let (slot, handle) = route(document)?;
        let id = slot
            .engine
            .annotate(handle, page, Rect::new(x, y, width, height), content, kind)?;
        marshal::into_c_string(id.to_string())
    })
}

/// Remove an annotation by id. True iff it existed.
///
/// # Safety
/// `annotation_id` must be a NUL-terminated string valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_remove_annotation(document: u64, annotation_id: *const c_char) -> bool {
    guard("remove_annotation", || false, || {
        // SAFETY: caller contract.
        let id = unsafe { marshal::read_str(annotation_id, "annotation_id") }?;
        let (slot, handle) = route(document)?;
        slot.engine.remove_annotation(handle, &AnnotationId::from(id))
    })
}

/// Annotations as a JSON array, for one page or all pages when `page` is 0.
/// `"[]"` on failure. Caller frees.
#[unsafe(no_mangle)]
pub extern "C" fn dokwerk_get_annotations(document: u64, page: u32) -> *mut c_char {
    guard("get_annotations", || json_literal(c"[]"), || {
        let (slot, handle) = route(document)?;
        let annotations = if page == 0 {
            slot.engine.annotations(handle)?
        } else {
            slot.engine.annotations_for_page(handle, page)?
        };
        marshal::into_c_string(marshal::encode_annotations(&annotations)?)
    })
}

// -- Plugin dispatch ---------------------------------------------------------------------

/// Result of `dokwerk_dispatch`. Every pointer is library-owned; release the
/// whole record with `dokwerk_plugin_result_free`.
#[repr(C)]
#[derive(Debug)]
pub struct DokwerkPluginResult {
    /// `Ok` when a plugin ran and succeeded, `PluginProcessingFailure` when
    /// it ran and reported failure, otherwise why dispatch did not happen.
    pub status: DokwerkStatus,
    pub success: bool,
    pub data: *mut u8,
    pub data_len: usize,
    /// MIME type of `data`; empty when nothing ran.
    pub format: *mut c_char,
    /// Output metadata as a JSON object.
    pub metadata_json: *mut c_char,
    /// Failure message, or null.
    pub error: *mut c_char,
}

impl DokwerkPluginResult {
    fn failed(status: DokwerkStatus) -> Self {
        Self {
            status,
            success: false,
            data: ptr::null_mut(),
            data_len: 0,
            format: ptr::null_mut(),
            metadata_json: ptr::null_mut(),
            error: ptr::null_mut(),
        }
    }
}

/// Run the first ready plugin providing `capability` (e.g. `"watermark"`,
/// `"custom:redact"`) on the document's content. `params_json` is a JSON
/// object of plugin parameters, or null.
///
/// # Safety
/// `capability` must be a NUL-terminated string; `params_json` must be null or
/// a NUL-terminated string. Both must be valid for the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_dispatch(
    document: u64,
    capability: *const c_char,
    params_json: *const c_char,
) -> DokwerkPluginResult {
    let result = guard("dispatch", || None, || {
        // SAFETY: caller contract.
        let capability = marshal::decode_capability(unsafe { marshal::read_str(capability, "capability") }?)?;
        // SAFETY: caller contract.
        let parameters = marshal::decode_params(unsafe { marshal::read_optional_str(params_json, "params_json") }?)?;
        let (slot, handle) = route(document)?;

        let input = PluginInput {
            parameters,
            ..PluginInput::default()
        };
        let output = slot
            .runtime
            .block_on(slot.engine.dispatch(handle, &capability, input))?;

        // Every fallible step happens before anything is handed to the host.
        let metadata_json = marshal::to_c_string(marshal::encode_params(&output.metadata)?)?;
        let format = marshal::to_c_string_lossy(output.format);
        let error = output.error.map(marshal::to_c_string_lossy);
        let (data, data_len) = marshal::into_c_bytes(output.data);
        Ok(Some(DokwerkPluginResult {
            status: if output.success {
                DokwerkStatus::Ok
            } else {
                DokwerkStatus::PluginProcessingFailure
            },
            success: output.success,
            data,
            data_len,
            format: format.into_raw(),
            metadata_json: metadata_json.into_raw(),
            error: error.map_or(ptr::null_mut(), CString::into_raw),
        }))
    });
    result.unwrap_or_else(|| DokwerkPluginResult::failed(status::last_status()))
}

/// Release every buffer held by `result` and null its pointers. Safe to call
/// twice on the same record.
///
/// # Safety
/// `result` must be null or point to a record returned by `dokwerk_dispatch`
/// whose buffers have not been released some other way.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dokwerk_plugin_result_free(result: *mut DokwerkPluginResult) {
    // SAFETY: caller contract; null is checked by `as_mut`.
    let Some(result) = (unsafe { result.as_mut() }) else {
        return;
    };
    // SAFETY: each pointer was produced by the marshaler and is nulled below.
    unsafe {
        marshal::free_c_bytes(result.data, result.data_len);
        marshal::free_c_string(result.format);
        marshal::free_c_string(result.metadata_json);
        marshal::free_c_string(result.error);
    }
    result.data = ptr::null_mut();
    result.data_len = 0;
    result.format = ptr::null_mut();
    result.metadata_json = ptr::null_mut();
    result.error = ptr::null_mut();
}
