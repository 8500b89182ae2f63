// src/utils/html.rs

/// Strips unsafe markup from admin-supplied question text.
///
/// Whitelist-based: harmless formatting tags survive, while `<script>` (with
/// its contents), `<iframe>` and event-handler attributes are removed.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
