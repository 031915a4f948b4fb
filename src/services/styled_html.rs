//! Styled text rendering as HTML
//!
//! Renders highlighted lines the way the editor would lay out its tokens:
//! a `<pre>` carrying the theme's `cm-s-<name>` class and one `<span>` per
//! styled run, with every token class prefixed by `cm-`.

use crate::primitives::highlighter::DEFAULT_THEME;
use crate::primitives::tokenizer::StyledLine;

/// Editor class list for a style string: `"tm-3 em"` -> `"cm-tm-3 cm-em"`
pub fn token_classes(style: &str) -> String {
    style
        .split_whitespace()
        .map(|class| format!("cm-{class}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_escaped(html: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '&' => html.push_str("&amp;"),
            '"' => html.push_str("&quot;"),
            '\'' => html.push_str("&#39;"),
            _ => html.push(ch),
        }
    }
}

/// Render highlighted lines to a `<pre>` block
pub fn render_lines_html(lines: &[StyledLine], theme_name: &str) -> String {
    let mut html = String::new();
    if theme_name == DEFAULT_THEME {
        html.push_str("<pre class=\"CodeMirror cm-s-default\">");
    } else {
        html.push_str(&format!("<pre class=\"CodeMirror cm-s-{theme_name}\">"));
    }

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            html.push('\n');
        }
        let mut offset = 0;
        for span in &line.spans {
            let start = span.range.start.min(line.text.len());
            let end = span.range.end.min(line.text.len());
            if start > offset {
                push_escaped(&mut html, line.text.get(offset..start).unwrap_or_default());
            }
            let text = line.text.get(start..end).unwrap_or_default();
            match &span.style {
                Some(style) => {
                    html.push_str(&format!("<span class=\"{}\">", token_classes(style)));
                    push_escaped(&mut html, text);
                    html.push_str("</span>");
                }
                None => push_escaped(&mut html, text),
            }
            offset = offset.max(end);
        }
        if offset < line.text.len() {
            push_escaped(&mut html, line.text.get(offset..).unwrap_or_default());
        }
    }

    html.push_str("</pre>");
    html
}

/// A standalone HTML document with the given stylesheets
pub fn render_document(stylesheets: &[String], body: &str) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    for css in stylesheets {
        html.push_str("<style>\n");
        html.push_str(css);
        html.push_str("</style>\n");
    }
    html.push_str("</head>\n<body>\n");
    html.push_str(body);
    html.push_str("\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tokenizer::StyledSpan;

    fn line(text: &str, spans: Vec<(std::ops::Range<usize>, Option<&str>)>) -> StyledLine {
        StyledLine {
            text: text.to_string(),
            spans: spans
                .into_iter()
                .map(|(range, style)| StyledSpan {
                    range,
                    style: style.map(str::to_owned),
                })
                .collect(),
        }
    }

    #[test]
    fn test_render_html_with_classes() {
        let lines = vec![line("fn main()", vec![(0..2, Some("tm-2 strong")), (2..9, None)])];
        let html = render_lines_html(&lines, "solar");

        assert!(html.starts_with("<pre class=\"CodeMirror cm-s-solar\">"));
        assert!(html.contains("<span class=\"cm-tm-2 cm-strong\">fn</span> main()"));
        assert!(html.ends_with("</pre>"));
    }

    #[test]
    fn test_render_html_escapes_special_chars() {
        let lines = vec![
            line("<script>&test</script>", vec![(0..8, Some("tag"))]),
            line("", vec![]),
        ];
        let html = render_lines_html(&lines, DEFAULT_THEME);

        assert!(html.contains("<span class=\"cm-tag\">&lt;script&gt;</span>&amp;test"));
        assert!(!html.contains("<script>"));
        assert!(html.ends_with("\n</pre>"));
    }

    #[test]
    fn test_document_embeds_stylesheets() {
        let doc = render_document(&[".cm-s-a .cm-tm-1 { color: #fff; }\n".to_string()], "<pre></pre>");
        assert!(doc.contains("<style>\n.cm-s-a .cm-tm-1"));
        assert!(doc.contains("<body>\n<pre></pre>"));
    }
}
