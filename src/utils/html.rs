// src/utils/html.rs

/// Sanitizes user-supplied text with ammonia's allow-list.
///
/// Safe inline tags survive; `<script>`, event handlers and the like are
/// stripped. Applied to names, prompts and explanations. Answer options are
/// compared verbatim during grading and are never passed through here.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_and_keeps_text() {
        assert_eq!(clean_html("Solve <script>alert(1)</script>x + 1"), "Solve x + 1");
        assert_eq!(clean_html("<b>2</b> + 2"), "<b>2</b> + 2");
    }
}
