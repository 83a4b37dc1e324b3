//! YAML → [`Composition`].
//!
//! Example:
//! ```yaml
//! config: { fps: 30 }
//! items:
//!   - kind: scene
//!     id: intro
//!     transition_to_next: { effect: wipe, duration: "12f", mode: insert }
//!     cues:
//!       - { id: hello, text: "Welcome to the tour." }
//!       - pause: "0.5s"
//!   - kind: mark
//!     id: drop
//!     at: "scene(intro).end - 10f"
//!   - kind: scene
//!     id: body
//!     cues:
//!       - { id: body-1, text: "Here is the main part." }
//! ```

use narrate_core::composition::Composition;

use crate::error::{CompileError, Result};

/// Parse a composition document. Only shape is checked here; ids and
/// expressions are validated by [`crate::prepare`].
pub fn parse_composition(yaml_src: &str) -> Result<Composition> {
    let doc: Composition = serde_yaml::from_str(yaml_src)?;
    if doc.items.is_empty() {
        return Err(CompileError::Dsl("composition has no items".into()));
    }
    Ok(doc)
}
