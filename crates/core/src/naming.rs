//! Deterministic asset naming for republished generations.
//!
//! The gallery filename is derived from the prompt and the generation id
//! so that re-running the orchestrator for the same generation always
//! targets the same destination name.

/// Maximum length of the sanitized prompt prefix.
const MAX_PREFIX_LEN: usize = 40;

/// Derive the destination filename for a generation.
///
/// Convention: `{sanitized_prompt_prefix}_{generation_id}.mp4`
///
/// The prompt is lowercased, every run of characters outside `[a-z0-9_-]`
/// collapses to a single `_`, and the prefix is capped at 40 characters.
/// An empty or fully-sanitized-away prompt falls back to `"video"`.
///
/// # Examples
///
/// ```
/// use vlab_core::naming::asset_filename;
///
/// assert_eq!(
///     asset_filename("A red fox, running!", "gen_01"),
///     "a_red_fox_running_gen_01.mp4"
/// );
/// ```
pub fn asset_filename(prompt: &str, generation_id: &str) -> String {
    let mut prefix = String::with_capacity(MAX_PREFIX_LEN);
    let mut last_was_sep = true; // suppress a leading separator

    for ch in prompt.chars().flat_map(|c| c.to_lowercase()) {
        if prefix.len() >= MAX_PREFIX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' {
            prefix.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            prefix.push('_');
            last_was_sep = true;
        }
    }

    // Drop a trailing separator left by punctuation at the cut point.
    while prefix.ends_with('_') {
        prefix.pop();
    }
    if prefix.is_empty() {
        prefix.push_str("video");
    }

    format!("{prefix}_{generation_id}.mp4")
}
