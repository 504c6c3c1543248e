use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use xmltree::{Element, EmitterConfig, XMLNode};

const ROOT: &str = "flow-definition";
const TRIGGER_PATH: [&str; 5] = [
    "properties",
    "org.jenkinsci.plugins.workflow.job.properties.PipelineTriggersJobProperty",
    "triggers",
    "hudson.triggers.TimerTrigger",
    "spec",
];

static RE_DECLARATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*<\?xml[^>]*\?>").unwrap());

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Parse(#[from] xmltree::ParseError),
    #[error("cannot serialize document: {0}")]
    Write(String),
    #[error("unsupported job type <{0}>, only pipeline jobs can be scheduled")]
    UnexpectedRoot(String),
    #[error("serialized document is not utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Sets the timer trigger of a pipeline job configuration to `schedule`.
///
/// Returns the rewritten document, or `None` when the job already runs on
/// exactly that schedule.
pub fn set_timer_trigger(raw: &str, schedule: &str) -> Result<Option<String>, DocumentError> {
    let body = RE_DECLARATION.replace(raw, "");
    let mut root = Element::parse(body.as_bytes())?;
    if root.name != ROOT {
        return Err(DocumentError::UnexpectedRoot(root.name));
    }

    let spec = TRIGGER_PATH
        .iter()
        .fold(&mut root, |element, name| select_or_create(element, name));

    let current = spec.get_text().map(|t| t.into_owned()).unwrap_or_default();
    if current == schedule {
        return Ok(None);
    }

    spec.children
        .retain(|node| !matches!(node, XMLNode::Text(_) | XMLNode::CData(_)));
    spec.children.push(XMLNode::Text(schedule.to_string()));

    let mut out = Vec::new();
    root.write_with_config(
        &mut out,
        EmitterConfig::new()
            .perform_indent(true)
            .indent_string("  ")
            .write_document_declaration(false),
    )
    .map_err(|e| DocumentError::Write(e.to_string()))?;
    Ok(Some(String::from_utf8(out)?))
}

fn select_or_create<'a>(parent: &'a mut Element, name: &str) -> &'a mut Element {
    let index = match parent
        .children
        .iter()
        .position(|node| matches!(node, XMLNode::Element(e) if e.name == name))
    {
        Some(index) => index,
        None => {
            parent.children.push(XMLNode::Element(Element::new(name)));
            parent.children.len() - 1
        }
    };
    match &mut parent.children[index] {
        XMLNode::Element(element) => element,
        // position() only ever matches element nodes
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pipeline_config;

    fn read_spec(xml: &str) -> Option<String> {
        let mut element = Element::parse(xml.as_bytes()).unwrap();
        for name in TRIGGER_PATH {
            element = element.take_child(name)?;
        }
        element.get_text().map(|t| t.into_owned())
    }

    #[test]
    fn creates_missing_trigger_chain() {
        let updated = set_timer_trigger(&pipeline_config(None), "H 2 * * *")
            .unwrap()
            .unwrap();

        assert_eq!(read_spec(&updated).as_deref(), Some("H 2 * * *"));
        assert!(updated.contains("<description>demo</description>"));
        assert!(!updated.starts_with("<?xml"));
    }

    #[test]
    fn replaces_existing_schedule() {
        let updated = set_timer_trigger(&pipeline_config(Some("@daily")), "H/15 * * * *")
            .unwrap()
            .unwrap();

        assert_eq!(read_spec(&updated).as_deref(), Some("H/15 * * * *"));
        assert_eq!(updated.matches("<spec>").count(), 1);
    }

    #[test]
    fn identical_schedule_is_left_alone() {
        let unchanged = set_timer_trigger(&pipeline_config(Some("@daily")), "@daily").unwrap();
        assert!(unchanged.is_none());
    }

    #[test]
    fn rejects_freestyle_jobs() {
        let err = set_timer_trigger("<project><builders/></project>", "@daily").unwrap_err();
        assert!(matches!(err, DocumentError::UnexpectedRoot(name) if name == "project"));
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = set_timer_trigger("<flow-definition><properties>", "@daily").unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));
    }
}
