use super::{Document, Node, NodeId};

/// A parsed selector: comma-separated alternatives, each a descendant chain
/// of compound simple selectors.
///
/// Supported pieces: `tag`, `#id`, `.class`, `[attr]`, `[attr="v"]`,
/// `[attr*="v"]`. This is deliberately the smallest language the probing
/// strategy tables need; anything else fails to parse and therefore never
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Vec<Compound>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Constraint {
    Tag(String),
    Id(String),
    Class(String),
    AttrPresent(String),
    AttrEquals(String, String),
    AttrContains(String, String),
}

impl Selector {
    pub fn parse(text: &str) -> Option<Self> {
        let mut alternatives = Vec::new();
        for alternative in text.split(',') {
            let alternative = alternative.trim();
            if alternative.is_empty() {
                return None;
            }
            let mut chain = Vec::new();
            for compound in alternative.split_whitespace() {
                chain.push(parse_compound(compound)?);
            }
            if chain.is_empty() {
                return None;
            }
            alternatives.push(chain);
        }
        if alternatives.is_empty() {
            return None;
        }
        Some(Self { alternatives })
    }

    /// True when `id` matches any alternative. Descendant chains match in the
    /// usual way: the final compound must match the node itself and each
    /// earlier compound must match some strictly higher ancestor, in order.
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|chain| matches_chain(doc, id, chain))
    }
}

fn matches_chain(doc: &Document, id: NodeId, chain: &[Compound]) -> bool {
    let (last, ancestors_chain) = match chain.split_last() {
        Some(parts) => parts,
        None => return false,
    };
    let Some(node) = doc.get(id) else {
        return false;
    };
    if !matches_compound(node, last) {
        return false;
    }

    // Greedy upward walk: every remaining compound must be satisfied by some
    // ancestor, outermost-first in the selector meaning innermost-last here.
    let mut remaining = ancestors_chain.iter().rev();
    let mut target = remaining.next();
    let mut current = node.parent();
    while let (Some(compound), Some(ancestor_id)) = (target, current) {
        let Some(ancestor) = doc.get(ancestor_id) else {
            return false;
        };
        if matches_compound(ancestor, compound) {
            target = remaining.next();
        }
        current = ancestor.parent();
    }
    target.is_none()
}

fn matches_compound(node: &Node, compound: &Compound) -> bool {
    compound.constraints.iter().all(|constraint| {
        match constraint {
            Constraint::Tag(tag) => node.tag() == tag,
            Constraint::Id(id) => node.element_id() == Some(id.as_str()),
            Constraint::Class(class) => node.has_class(class),
            Constraint::AttrPresent(name) => node.attr(name).is_some(),
            Constraint::AttrEquals(name, value) => node.attr(name) == Some(value.as_str()),
            Constraint::AttrContains(name, value) => node
                .attr(name)
                .is_some_and(|existing| existing.contains(value.as_str())),
        }
    })
}

fn parse_compound(text: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut rest = text;

    // Optional leading tag name.
    let tag_len = rest
        .char_indices()
        .find(|(_, ch)| matches!(ch, '#' | '.' | '['))
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    if tag_len > 0 {
        let tag = &rest[..tag_len];
        if tag != "*" {
            if !is_identifier(tag) {
                return None;
            }
            compound.constraints.push(Constraint::Tag(tag.to_string()));
        }
        rest = &rest[tag_len..];
    }

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('#') {
            let (name, next) = take_identifier(tail)?;
            compound.constraints.push(Constraint::Id(name));
            rest = next;
        } else if let Some(tail) = rest.strip_prefix('.') {
            let (name, next) = take_identifier(tail)?;
            compound.constraints.push(Constraint::Class(name));
            rest = next;
        } else if let Some(tail) = rest.strip_prefix('[') {
            let close = tail.find(']')?;
            let body = &tail[..close];
            compound.constraints.push(parse_attr(body)?);
            rest = &tail[close + 1..];
        } else {
            return None;
        }
    }

    if compound.constraints.is_empty() {
        return None;
    }
    Some(compound)
}

fn parse_attr(body: &str) -> Option<Constraint> {
    if let Some((name, raw_value)) = body.split_once("*=") {
        let name = name.trim();
        if !is_identifier(name) {
            return None;
        }
        return Some(Constraint::AttrContains(
            name.to_string(),
            unquote(raw_value.trim())?,
        ));
    }
    if let Some((name, raw_value)) = body.split_once('=') {
        let name = name.trim();
        if !is_identifier(name) {
            return None;
        }
        return Some(Constraint::AttrEquals(
            name.to_string(),
            unquote(raw_value.trim())?,
        ));
    }
    let name = body.trim();
    if !is_identifier(name) {
        return None;
    }
    Some(Constraint::AttrPresent(name.to_string()))
}

fn unquote(raw: &str) -> Option<String> {
    if raw.len() >= 2 && (raw.starts_with('"') && raw.ends_with('"')
        || raw.starts_with('\'') && raw.ends_with('\''))
    {
        return Some(raw[1..raw.len() - 1].to_string());
    }
    if raw.is_empty() {
        return None;
    }
    Some(raw.to_string())
}

fn take_identifier(text: &str) -> Option<(String, &str)> {
    let end = text
        .char_indices()
        .find(|(_, ch)| !is_identifier_char(*ch))
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    Some((text[..end].to_string(), &text[end..]))
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_identifier_char)
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeSpec;

    fn doc_with(specs: Vec<NodeSpec>) -> Document {
        Document::from_snapshot(&specs)
    }

    fn parse(text: &str) -> Selector {
        Selector::parse(text).expect("selector parses")
    }

    #[test]
    fn matches_class_id_and_tag() {
        let doc = doc_with(vec![NodeSpec::new("div")
            .class("media-modal-content")
            .child(NodeSpec::new("input").id("attachment-details-title"))]);

        assert!(doc.query(&parse(".media-modal-content")).is_some());
        assert!(doc.query(&parse("#attachment-details-title")).is_some());
        assert!(doc.query(&parse("input#attachment-details-title")).is_some());
        assert!(doc.query(&parse("span#attachment-details-title")).is_none());
    }

    #[test]
    fn attribute_forms_match() {
        let doc = doc_with(vec![NodeSpec::new("input")
            .attr("name", "attachments[42][image_alt]")
            .attr("data-setting", "alt")]);

        assert!(doc.query(&parse("input[name*=\"[image_alt]\"]")).is_some());
        assert!(doc.query(&parse("input[data-setting=\"alt\"]")).is_some());
        assert!(doc.query(&parse("input[data-setting]")).is_some());
        assert!(doc.query(&parse("input[data-setting=\"title\"]")).is_none());
    }

    #[test]
    fn descendant_chain_requires_ordered_ancestors() {
        let doc = doc_with(vec![NodeSpec::new("div").class("setting").attr(
            "data-setting",
            "title",
        )
        .child(NodeSpec::new("span").child(NodeSpec::new("input")))]);

        assert!(doc
            .query(&parse(".setting[data-setting=\"title\"] input"))
            .is_some());
        assert!(doc
            .query(&parse(".setting[data-setting=\"alt\"] input"))
            .is_none());
        // The chained compound must match an ancestor, not the node itself.
        assert!(doc.query(&parse("input .setting")).is_none());
    }

    #[test]
    fn alternatives_match_any_branch() {
        let doc = doc_with(vec![NodeSpec::new("div").class("et-fb-modal")]);
        let selector = parse(".media-modal-content, .elementor-modal-content, .et-fb-modal");
        assert!(doc.query(&selector).is_some());
    }

    #[test]
    fn malformed_selectors_fail_to_parse() {
        assert!(Selector::parse("").is_none());
        assert!(Selector::parse("div >> input").is_none());
        assert!(Selector::parse("[=broken]").is_none());
        assert!(Selector::parse("a, ").is_none());
    }
}
