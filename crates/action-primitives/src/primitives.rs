//! Action primitives implementation
//!
//! One `execute_*` function per leaf action:
//! - page: navigate, click/hover, type/press, select, scroll, wait, screenshot
//! - data: set, merge, csv
//! - script: javascript
//! - sub-task: start

mod click;
mod data;
mod navigate;
mod screenshot;
mod script;
mod scroll;
mod select;
mod start;
mod type_text;
mod wait;

pub use click::*;
pub use data::*;
pub use navigate::*;
pub use screenshot::*;
pub use script::*;
pub use scroll::*;
pub use select::*;
pub use start::*;
pub use type_text::*;
pub use wait::*;

use std::time::Duration;

use rand::Rng;
use scraper::Selector;

use crate::{errors::ActionError, types::ExecCtx};

const HUMAN_DELAY_MIN_MS: u64 = 80;
const HUMAN_DELAY_MAX_MS: u64 = 300;

/// Rejects empty or unparsable CSS selectors before they reach the driver.
pub(crate) fn ensure_selector(selector: &str) -> Result<(), ActionError> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(ActionError::InvalidSelector("Selector cannot be empty".to_string()));
    }
    Selector::parse(trimmed)
        .map(|_| ())
        .map_err(|err| ActionError::InvalidSelector(format!("`{trimmed}`: {err:?}")))
}

/// Short jittered pause before interactions when human delays are enabled.
pub(crate) async fn behavior_pause(ctx: &ExecCtx) {
    if !ctx.behavior.human_delays {
        return;
    }
    let millis = rand::thread_rng().gen_range(HUMAN_DELAY_MIN_MS..=HUMAN_DELAY_MAX_MS);
    let pause = Duration::from_millis(millis).min(ctx.remaining_time());
    tokio::time::sleep(pause).await;
}
