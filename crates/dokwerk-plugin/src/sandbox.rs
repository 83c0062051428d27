// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded plugin execution.
//
// Runs `Plugin::process` on tokio's blocking pool under a timeout, checks the
// memory budget on both sides of the call, and converts every way a plugin can
// misbehave (error, panic, overrun, oversized result) into a failure
// `PluginOutput`. Nothing here touches engine state.

use std::any::Any;
use std::sync::Arc;

use dokwerk_core::PluginConfig;
use tracing::{debug, instrument, warn};

use crate::plugin::{Plugin, PluginInput, PluginOutput};

/// Run one `process` call under `config`'s timeout and memory budget.
///
/// On timeout the worker thread is abandoned, not killed: it finishes in the
/// background and its result is dropped.
#[instrument(skip_all, fields(plugin = %plugin.name(), bytes_len = input.data.len()))]
pub async fn run(plugin: Arc<dyn Plugin>, input: PluginInput, config: &PluginConfig) -> PluginOutput {
    let name = plugin.name().to_owned();
    let budget = config.memory_budget_bytes();

    let input_size = input.payload_size();
    if input_size > budget {
        warn!(input_size, budget, "Input refused before dispatch");
        return PluginOutput::failure(format!(
            "plugin {name}: input of {input_size} bytes exceeds the memory budget of {budget} bytes"
        ));
    }

    let timeout = config.timeout();
    let worker = tokio::task::spawn_blocking(move || plugin.process(&input));

    let output = match tokio::time::timeout(timeout, worker).await {
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Plugin abandoned after timeout");
            return PluginOutput::failure(format!(
                "plugin {name} timed out after {}ms",
                timeout.as_millis()
            ));
        }
        Ok(Err(join_err)) if join_err.is_panic() => {
            let detail = panic_message(join_err.into_panic());
            warn!(%detail, "Plugin panicked");
            return PluginOutput::failure(format!("plugin {name} panicked: {detail}"));
        }
        Ok(Err(join_err)) => {
            warn!(%join_err, "Plugin task cancelled");
            return PluginOutput::failure(format!("plugin {name} was cancelled: {join_err}"));
        }
        Ok(Ok(Err(err))) => {
            debug!(%err, "Plugin returned an error");
            return PluginOutput::failure(format!("plugin {name} failed: {err}"));
        }
        Ok(Ok(Ok(output))) => output,
    };

    let output_size = output.payload_size();
    if output_size > budget {
        warn!(output_size, budget, "Oversized plugin result discarded");
        return PluginOutput::failure(format!(
            "plugin {name}: output of {output_size} bytes exceeds the memory budget of {budget} bytes"
        ));
    }

    debug!(success = output.success, output_size, "Plugin finished");
    output
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
