use altpilot_contracts::asset::{AssetKind, AssetSnapshot};
use altpilot_contracts::dom::{Document, Node, NodeId, Selector};
use altpilot_contracts::remote::MetadataField;

/// Optional host-provided data API (the equivalent of asking the host's own
/// media model instead of scraping the document). Lookups that fail are
/// treated as non-matches.
pub trait HostDataApi {
    fn field(&self, asset_id: &str, key: &str) -> Option<String>;
}

/// Ordered from most to least trustworthy: an id-qualified selector cannot
/// cross-talk when several regions are open, generic patterns catch host
/// shapes that do not qualify their fields.
const TITLE_STRATEGIES: &[&str] = &[
    "#attachment_{id}_title",
    "input[name*=\"[post_title]\"]",
    "#attachment-details-title",
    "input[data-setting=\"title\"]",
    ".setting[data-setting=\"title\"] input",
    "input.attachment-title",
    "#title",
];

const ALT_STRATEGIES: &[&str] = &[
    "#attachment_{id}_alt",
    "input[name*=\"[image_alt]\"]",
    "#attachment-details-alt-text",
    "input[data-setting=\"alt\"]",
    ".setting[data-setting=\"alt\"] input",
    "input.attachment-alt",
];

const TITLE_TEXT_FALLBACK: &str = ".attachment-details .title";

const URL_SPECIFIC_STRATEGIES: &[&str] = &[
    ".media-modal .attachment[data-id=\"{id}\"] img",
    ".media-modal img[data-attachment-id=\"{id}\"]",
    ".attachment-details[data-id=\"{id}\"] .details-image img",
    ".attachment-details .details-image img",
    ".elementor-modal .attachment[data-id=\"{id}\"] img",
    ".vc_ui-panel .attachment[data-id=\"{id}\"] img",
    ".et-fb-modal .attachment[data-id=\"{id}\"] img",
];

const URL_FIELD_STRATEGY: &str =
    "#attachment-details-two-column-copy-link, #attachment-details-copy-link, input[name*=\"[url]\"]";

const URL_GENERIC_STRATEGIES: &[&str] = &[".attachment-preview img", ".details-image img"];

const SELECTED_ATTACHMENT: &str = ".attachment.selected, .attachment.details";

const MIME_FIELD: &str =
    ".attachment-details .details[data-setting=\"mime\"] .value, .details[data-setting=\"mime\"]";

const FILENAME_FIELD: &str = ".attachment-details .filename, .details[data-setting=\"filename\"]";

#[derive(Default)]
pub struct FieldResolver {
    data_api: Option<Box<dyn HostDataApi>>,
}

impl FieldResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_api(api: Box<dyn HostDataApi>) -> Self {
        Self {
            data_api: Some(api),
        }
    }

    /// First non-empty match in strategy order; empty string when every
    /// strategy misses. Never an error.
    pub fn resolve_title(&self, doc: &Document, asset_id: &str) -> String {
        for template in TITLE_STRATEGIES {
            if let Some(value) = probe_value(doc, template, asset_id) {
                return value;
            }
        }
        if let Some(text) = probe_text(doc, TITLE_TEXT_FALLBACK) {
            return text;
        }
        self.api_field(asset_id, "title").unwrap_or_default()
    }

    pub fn resolve_alt(&self, doc: &Document, asset_id: &str) -> String {
        for template in ALT_STRATEGIES {
            if let Some(value) = probe_value(doc, template, asset_id) {
                return value;
            }
        }
        self.api_field(asset_id, "alt").unwrap_or_default()
    }

    pub fn resolve_url(&self, doc: &Document, asset_id: &str) -> String {
        if let Some(url) = self.api_field(asset_id, "url") {
            return url;
        }
        for template in URL_SPECIFIC_STRATEGIES {
            if let Some(url) = probe_image_src(doc, template, asset_id) {
                return url;
            }
        }
        if let Some(url) = selected_attachment_src(doc, asset_id) {
            return url;
        }
        if let Some(url) = probe_value(doc, URL_FIELD_STRATEGY, asset_id)
            .filter(|value| value.contains("/uploads/"))
        {
            return url;
        }
        for template in URL_GENERIC_STRATEGIES {
            if let Some(url) = probe_image_src(doc, template, asset_id) {
                return url;
            }
        }
        String::new()
    }

    /// Vector detection is independent of the raster lookup strategies: url
    /// extension first, then mime and filename fields, then the data API.
    pub fn resolve_kind(&self, doc: &Document, asset_id: &str, url: &str) -> AssetKind {
        if url.to_lowercase().ends_with(".svg") {
            return AssetKind::Vector;
        }
        if probe_text(doc, MIME_FIELD).is_some_and(|mime| mime.contains("svg")) {
            return AssetKind::Vector;
        }
        if probe_text(doc, FILENAME_FIELD)
            .is_some_and(|name| name.to_lowercase().ends_with(".svg"))
        {
            return AssetKind::Vector;
        }
        if self
            .api_field(asset_id, "mime")
            .is_some_and(|mime| mime.contains("svg"))
        {
            return AssetKind::Vector;
        }
        if self
            .api_field(asset_id, "filename")
            .is_some_and(|name| name.to_lowercase().ends_with(".svg"))
        {
            return AssetKind::Vector;
        }
        AssetKind::Raster
    }

    pub fn snapshot(&self, doc: &Document, asset_id: &str) -> AssetSnapshot {
        let title = self.resolve_title(doc, asset_id);
        let alt_text = self.resolve_alt(doc, asset_id);
        let preview_url = self.resolve_url(doc, asset_id);
        let kind = self.resolve_kind(doc, asset_id, &preview_url);
        AssetSnapshot {
            id: asset_id.to_string(),
            title,
            alt_text,
            preview_url,
            kind,
        }
    }

    fn api_field(&self, asset_id: &str, key: &str) -> Option<String> {
        self.data_api
            .as_ref()
            .and_then(|api| api.field(asset_id, key))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// First matching node for a writable field, in the same strategy order the
/// resolver reads with. Used when reflecting a generated value back into the
/// host; unlike reads, an empty current value still counts as a target.
pub fn field_target(doc: &Document, field: MetadataField, asset_id: &str) -> Option<NodeId> {
    let strategies = match field {
        MetadataField::Title => TITLE_STRATEGIES,
        MetadataField::Alt => ALT_STRATEGIES,
    };
    for template in strategies {
        let Some(selector) = Selector::parse(&expand(template, asset_id)) else {
            continue;
        };
        if let Some(id) = doc.query(&selector) {
            return Some(id);
        }
    }
    None
}

fn expand(template: &str, asset_id: &str) -> String {
    template.replace("{id}", asset_id)
}

fn probe_value(doc: &Document, template: &str, asset_id: &str) -> Option<String> {
    let selector = Selector::parse(&expand(template, asset_id))?;
    doc.query_all(&selector).into_iter().find_map(|id| {
        doc.get(id)
            .and_then(Node::value)
            .map(str::to_string)
            .filter(|value| !value.is_empty())
    })
}

fn probe_text(doc: &Document, selector_text: &str) -> Option<String> {
    let selector = Selector::parse(selector_text)?;
    doc.query_all(&selector).into_iter().find_map(|id| {
        doc.get(id)
            .map(|node| node.text().trim().to_string())
            .filter(|text| !text.is_empty())
    })
}

fn probe_image_src(doc: &Document, template: &str, asset_id: &str) -> Option<String> {
    let selector = Selector::parse(&expand(template, asset_id))?;
    doc.query_all(&selector).into_iter().find_map(|id| {
        doc.get(id)
            .and_then(|node| node.attr("src"))
            .map(str::to_string)
            .filter(|src| !src.is_empty() && !src.contains("placeholder"))
    })
}

fn selected_attachment_src(doc: &Document, asset_id: &str) -> Option<String> {
    let selector = Selector::parse(SELECTED_ATTACHMENT)?;
    let selected = doc.query(&selector)?;
    if doc.get(selected)?.attr("data-id") != Some(asset_id) {
        return None;
    }
    let img = Selector::parse("img")?;
    doc.query_within(selected, &img).into_iter().find_map(|id| {
        doc.get(id)
            .and_then(|node| node.attr("src"))
            .map(str::to_string)
            .filter(|src| !src.is_empty())
    })
}
