//! Mapping from TextMate scopes to the editor's built-in token classes.
//!
//! Used when no theme is active: the editor's stock stylesheet already knows
//! how to color these classes.

/// Editor token class for a single scope name, if it has one
pub fn scope_to_class(scope: &str) -> Option<&'static str> {
    let scope_lower = scope.to_lowercase();
    let s = scope_lower.as_str();

    if s.starts_with("comment") {
        return Some("comment");
    }

    if s.starts_with("string.regexp") {
        return Some("string-2");
    }
    if s.starts_with("string") {
        return Some("string");
    }

    // Markup before the generic keyword/punctuation checks
    if s.starts_with("markup.heading") || s.starts_with("entity.name.section") {
        return Some("header");
    }
    if s.starts_with("markup.bold") {
        return Some("strong");
    }
    if s.starts_with("markup.italic") {
        return Some("em");
    }
    if s.starts_with("markup.raw") || s.starts_with("markup.inline.raw") {
        return Some("string");
    }
    if s.starts_with("markup.underline") {
        return Some("link");
    }
    if s.starts_with("markup.quote") {
        return Some("quote");
    }
    if s.starts_with("markup.list") {
        return Some("variable-2");
    }
    if s.starts_with("markup.strikethrough") {
        return Some("strikethrough");
    }
    if s.starts_with("markup.inserted") {
        return Some("positive");
    }
    if s.starts_with("markup.deleted") {
        return Some("negative");
    }

    if s.starts_with("invalid") {
        return Some("error");
    }

    if s.starts_with("keyword.operator") || s.starts_with("punctuation") {
        return Some("operator");
    }
    if s.starts_with("keyword") || s.starts_with("storage.modifier") {
        return Some("keyword");
    }

    if s.starts_with("entity.name.function")
        || s.starts_with("support.function")
        || s.starts_with("meta.function-call")
        || s.starts_with("variable.function")
    {
        return Some("def");
    }

    if s.starts_with("entity.name.type")
        || s.starts_with("entity.name.class")
        || s.starts_with("entity.name.struct")
        || s.starts_with("entity.name.enum")
        || s.starts_with("entity.name.interface")
        || s.starts_with("entity.name.trait")
        || s.starts_with("entity.other.inherited-class")
        || s.starts_with("support.type")
        || s.starts_with("support.class")
        || s.starts_with("storage.type")
    {
        return Some("type");
    }

    if s.starts_with("constant.numeric") {
        return Some("number");
    }
    if s.starts_with("constant.language") || s.starts_with("constant.character") {
        return Some("atom");
    }
    if s.starts_with("constant") {
        return Some("builtin");
    }

    if s.starts_with("entity.name.tag") {
        return Some("tag");
    }
    if s.starts_with("entity.other.attribute") || s.starts_with("meta.attribute") {
        return Some("attribute");
    }
    if s.starts_with("support.other.property")
        || s.starts_with("meta.object-literal.key")
        || s.starts_with("variable.other.property")
        || s.starts_with("variable.other.object.property")
    {
        return Some("property");
    }

    if s.starts_with("variable.parameter") || s.starts_with("variable.language") {
        return Some("variable-2");
    }
    if s.starts_with("variable") {
        return Some("variable");
    }

    None
}

/// Class for a scope stack (innermost last): the innermost scope that maps
/// to a class wins.
pub fn scopes_to_class<S: AsRef<str>>(scopes: &[S]) -> Option<&'static str> {
    scopes
        .iter()
        .rev()
        .find_map(|scope| scope_to_class(scope.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_keywords_are_operators() {
        assert_eq!(scope_to_class("keyword.operator.assignment.x"), Some("operator"));
        assert_eq!(scope_to_class("keyword.control.x"), Some("keyword"));
        assert_eq!(scope_to_class("punctuation.separator"), Some("operator"));
    }

    #[test]
    fn test_markup_mapped_before_generic_rules() {
        assert_eq!(scope_to_class("markup.heading.1.markdown"), Some("header"));
        assert_eq!(scope_to_class("markup.underline.link"), Some("link"));
        assert_eq!(scope_to_class("markup.bold"), Some("strong"));
    }

    #[test]
    fn test_innermost_mapped_scope_wins() {
        let scopes = ["source.x", "string.quoted.double.x", "constant.character.escape.x"];
        assert_eq!(scopes_to_class(&scopes), Some("atom"));

        // Unmapped inner scopes fall through to their parents
        let scopes = ["source.x", "comment.line.x", "meta.unknown.x"];
        assert_eq!(scopes_to_class(&scopes), Some("comment"));

        assert_eq!(scopes_to_class(&["source.x", "meta.block.x"]), None);
        let empty: [&str; 0] = [];
        assert_eq!(scopes_to_class(&empty), None);
    }
}
