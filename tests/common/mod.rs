//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use narrate_core::config::CompileConfig;

/// Fresh, empty directory under the system temp dir.
pub fn temp_cache_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("narrate-tests-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Default config pointed at `root`.
pub fn config_at(root: &str) -> CompileConfig {
    CompileConfig {
        cache_root: root.to_string(),
        ..CompileConfig::default()
    }
}

/// Two narrated scenes around an insert transition, with a sound effect
/// and a trailing mark.
pub const TOUR: &str = r#"
config: { fps: 30 }
items:
  - kind: scene
    id: intro
    enter: fade-in
    cues:
      - id: hello
        text: "Welcome to the tour of the new release."
        audio:
          - { id: whoosh, kind: sfx, prompt: "soft whoosh", duration: 0.5, offset: "5f" }
      - pause: 0.5s
      - id: agenda
        text: "First the basics, then the details."
  - kind: transition
    id: t1
    effect: wipe
    mode: insert
    duration: 1s
  - kind: scene
    id: body
    cues:
      - id: body-1
        segments:
          - { text: "Here is the main part." }
          - { text: "And a short aside." }
    layers:
      - id: bg
        components:
          - { id: title, type: Title, props: { text: "Body" } }
  - kind: mark
    id: drop
    at: "scene(body).start + 10f"
"#;

/// Fixed-length scenes around an insert transition.
pub const INSERT: &str = r#"
items:
  - kind: scene
    id: A
    duration: 4s
  - kind: transition
    id: T
    mode: insert
    duration: 1s
  - kind: scene
    id: B
    duration: 2s
"#;

/// `n` chained scenes, each with one cue of `words` words.
pub fn chain(n: usize, words: usize) -> String {
    let text = vec!["word"; words].join(" ");
    let mut out = String::from("items:\n");
    for i in 0..n {
        out.push_str(&format!(
            "  - kind: scene\n    id: s{i}\n    cues:\n      - {{ id: c{i}, text: \"{text}\" }}\n"
        ));
        if i % 3 == 2 && i + 1 < n {
            out.push_str(&format!(
                "  - kind: transition\n    id: t{i}\n    mode: overlap\n    duration: 10f\n"
            ));
        }
    }
    out
}
