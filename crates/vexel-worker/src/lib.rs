//! Web worker entry point for vexel live previews.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. The main thread posts each new upload (or settings change)
//! and the worker answers with a canonical preview SVG built by
//! `vexel_export::frame_to_document`.
//!
//! Sampling runs in row chunks with a zero-delay timer between them, so
//! the worker keeps draining its message queue while a preview is in
//! flight. A newer request cancels the older run through a
//! [`RunGate`]; the older run stops at its next chunk boundary, and
//! even a run that already finished cannot post once it is stale.

use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use vexel_export::SvgMetadata;
use vexel_pipeline::{
    Clock, ContentArea, ConversionOptions, PreviewDiagnostics, PreviewSettings, PreviewStage,
    RunGate, RunTicket, WebClock,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Message protocol: the main thread sends a JS object with:
/// - `type`: `"preview"` (default) or `"cancel"`
/// - `imageBytes`: `Uint8Array` containing the raw image file bytes
/// - `optionsJson`: `String` containing JSON-serialized
///   `ConversionOptions` (optional; defaults apply)
/// - `constrained`: `bool`, use the coarse low-memory sampling grid
///
/// On success the worker responds with:
/// - `generation`: `f64`, the run this preview belongs to
/// - `ok`: `true`
/// - `svg`: `String`, the preview document
/// - `contentAreaJson`: `String` with the content area in original
///   pixels, present only when border removal is on. The main thread
///   forwards it as the `contentArea` form field on conversion.
/// - `diagnosticsJson`: `String`, JSON-serialized `PreviewDiagnostics`
///
/// On failure the worker responds with `generation`, `ok: false` and
/// `error: String`; the main thread clears its preview.
///
/// # Worker entry point
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() else {
        web_sys::console::error_1(&JsValue::from_str(
            "vexel-worker: not running in a DedicatedWorkerGlobalScope",
        ));
        return;
    };

    let gate = Rc::new(RunGate::new());
    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&gate, &event.data());
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // leak: lives for the worker lifetime
}

/// A decoded `preview` message.
struct PreviewRequest {
    image_bytes: Vec<u8>,
    options: ConversionOptions,
    settings: PreviewSettings,
}

impl PreviewRequest {
    fn from_js(data: &JsValue) -> Result<Self, String> {
        let image_bytes: js_sys::Uint8Array = field(data, "imageBytes")
            .dyn_into()
            .map_err(|_| "imageBytes is not a Uint8Array".to_owned())?;

        let options = match field(data, "optionsJson").as_string() {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| format!("failed to parse options: {e}"))?,
            None => ConversionOptions::default(),
        };

        let settings = if field(data, "constrained").as_bool().unwrap_or(false) {
            PreviewSettings::constrained()
        } else {
            PreviewSettings::default()
        };

        Ok(Self {
            image_bytes: image_bytes.to_vec(),
            options,
            settings,
        })
    }
}

fn field(data: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(data, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

fn handle_message(gate: &Rc<RunGate>, data: &JsValue) {
    match field(data, "type").as_string().as_deref() {
        Some("cancel") => {
            gate.cancel_all();
            log("preview cancelled");
        }
        None | Some("preview") => {
            let ticket = gate.begin();
            match PreviewRequest::from_js(data) {
                Ok(request) => {
                    wasm_bindgen_futures::spawn_local(run_preview(Rc::clone(gate), ticket, request));
                }
                Err(message) => post_failure(gate, &ticket, &message),
            }
        }
        Some(other) => warn(&format!("ignoring unknown message type {other:?}")),
    }
}

/// Everything posted back for a finished preview.
struct PreviewOutcome {
    svg: String,
    content_area: Option<ContentArea>,
    diagnostics: PreviewDiagnostics,
}

#[allow(clippy::future_not_send)]
async fn run_preview(gate: Rc<RunGate>, ticket: RunTicket, request: PreviewRequest) {
    let clock = WebClock;
    let start = clock.now();
    let PreviewRequest {
        image_bytes,
        options,
        settings,
    } = request;

    let stage = match PreviewStage::prepare(&image_bytes, &options, settings, &clock) {
        Ok(stage) => stage,
        Err(e) => {
            post_failure(&gate, &ticket, &e.to_string());
            return;
        }
    };
    drop(image_bytes);

    // Let queued messages run before sampling.
    TimeoutFuture::new(0).await;
    if ticket.token().is_cancelled() {
        return;
    }

    let t = clock.now();
    let mut job = stage.job(&options, settings);
    while !job.is_finished() {
        if ticket.token().is_cancelled() {
            return;
        }
        job.step();
        TimeoutFuture::new(0).await;
    }
    let frame = job.finish();
    let sample = clock.elapsed(&t);

    let metadata = SvgMetadata {
        title: Some("vexel preview"),
        description: None,
    };
    let svg = match vexel_export::frame_to_document(&frame, &metadata) {
        Ok(document) => document.into_string(),
        Err(e) => {
            post_failure(&gate, &ticket, &e.to_string());
            return;
        }
    };

    let outcome = PreviewOutcome {
        svg,
        content_area: stage.content_area(),
        diagnostics: stage.diagnostics(&frame, sample, clock.elapsed(&start)),
    };

    let generation = ticket.generation();
    if !gate.commit(&ticket, outcome, |outcome| post_success(generation, &outcome)) {
        log(&format!("discarded stale preview {generation}"));
    }
}

#[allow(clippy::cast_precision_loss)]
fn post_success(generation: u64, outcome: &PreviewOutcome) {
    log(&outcome.diagnostics.report());

    let response = js_sys::Object::new();
    set(&response, "generation", &JsValue::from_f64(generation as f64));
    set(&response, "ok", &JsValue::TRUE);
    set(&response, "svg", &JsValue::from_str(&outcome.svg));
    if let Some(area) = outcome.content_area {
        match serde_json::to_string(&area) {
            Ok(json) => set(&response, "contentAreaJson", &JsValue::from_str(&json)),
            Err(e) => warn(&format!("failed to serialize content area: {e}")),
        }
    }
    if let Ok(json) = serde_json::to_string(&outcome.diagnostics) {
        set(&response, "diagnosticsJson", &JsValue::from_str(&json));
    }
    post(&response);
}

/// Report a failed run, unless a newer run has superseded it.
#[allow(clippy::cast_precision_loss)]
fn post_failure(gate: &RunGate, ticket: &RunTicket, message: &str) {
    gate.commit(ticket, message, |message| {
        warn(&format!("preview failed: {message}"));
        let response = js_sys::Object::new();
        set(
            &response,
            "generation",
            &JsValue::from_f64(ticket.generation() as f64),
        );
        set(&response, "ok", &JsValue::FALSE);
        set(&response, "error", &JsValue::from_str(message));
        post(&response);
    });
}

fn set(target: &js_sys::Object, key: &str, value: &JsValue) {
    let _ = js_sys::Reflect::set(target, &JsValue::from_str(key), value);
}

fn post(response: &js_sys::Object) {
    match js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        Ok(global) => {
            if let Err(e) = global.post_message(response) {
                web_sys::console::error_2(&JsValue::from_str("vexel-worker: postMessage failed"), &e);
            }
        }
        Err(_) => web_sys::console::error_1(&JsValue::from_str("vexel-worker: not in worker scope")),
    }
}

fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

fn warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}
