// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in reference plugins shipped with the engine.

pub mod convert;
pub mod signature;
pub mod watermark;

use std::sync::Arc;

pub use convert::RasterToPdfPlugin;
pub use signature::DigestSignaturePlugin;
pub use watermark::StampWatermarkPlugin;

use crate::plugin::Plugin;

/// One instance of every built-in plugin, in their default registration order.
pub fn defaults() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(StampWatermarkPlugin::new()),
        Arc::new(DigestSignaturePlugin::new()),
        Arc::new(RasterToPdfPlugin::new()),
    ]
}
