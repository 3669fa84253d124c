//! Prompt compilation for rule-rule verification reports.
//!
//! The prompt is a constant document with named slots. Four slots carry the
//! caller's inputs (reference spec text, ruleset, checker output, agent spec
//! text); three carry the fixed worked examples. Templates are parsed once
//! into literal and slot segments and rejected unless every slot appears
//! exactly once, so rendering is a plain concatenation.
//!
//! ```text
//! ...attached Sleec document: {{spec_text}}.
//! ...
//! {{example_ruleset}}
//! ...
//! SLEEC Ruleset:
//!
//! {{ruleset}}
//! ```

use crate::templates::{
    CONFLICT_EXAMPLE_TXT, EXAMPLE_RULESET_SLEEC, REDUNDANCY_EXAMPLE_TXT, RULE_RULE_ANALYSIS_MD,
};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Returned verbatim instead of a report for every scope except rule-rule.
pub const UNSUPPORTED_SCOPE_PLACEHOLDER: &str =
    "Placeholder: Analysis for Model-Rule conflicts and/or combined conflicts will be implemented later.";

/// Named insertion points of the analysis template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    SpecText,
    ExampleRuleset,
    ConflictExample,
    RedundancyExample,
    Ruleset,
    CheckerOutput,
    AgentText,
}

impl Slot {
    pub const ALL: [Slot; 7] = [
        Slot::SpecText,
        Slot::ExampleRuleset,
        Slot::ConflictExample,
        Slot::RedundancyExample,
        Slot::Ruleset,
        Slot::CheckerOutput,
        Slot::AgentText,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Slot::SpecText => "spec_text",
            Slot::ExampleRuleset => "example_ruleset",
            Slot::ConflictExample => "conflict_example",
            Slot::RedundancyExample => "redundancy_example",
            Slot::Ruleset => "ruleset",
            Slot::CheckerOutput => "checker_output",
            Slot::AgentText => "agent_text",
        }
    }

    fn from_name(name: &str) -> Option<Slot> {
        Slot::ALL.into_iter().find(|slot| slot.name() == name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template slot {{{{{0}}}}}")]
    UnknownSlot(String),
    #[error("template slot {{{{{}}}}} is missing", .0.name())]
    MissingSlot(Slot),
    #[error("template slot {{{{{}}}}} appears more than once", .0.name())]
    DuplicateSlot(Slot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    Slot(Slot),
}

/// A parsed template: literal text interleaved with each slot exactly once.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `{{slot}}` markers out of `source`.
    pub fn parse(source: &'static str) -> Result<Self, TemplateError> {
        let source = source.strip_suffix('\n').unwrap_or(source);
        let mut segments = Vec::new();
        let mut seen = Vec::new();
        let mut cursor = 0;
        for caps in slot_marker().captures_iter(source) {
            let (Some(marker), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let slot = Slot::from_name(name.as_str())
                .ok_or_else(|| TemplateError::UnknownSlot(name.as_str().to_string()))?;
            if seen.contains(&slot) {
                return Err(TemplateError::DuplicateSlot(slot));
            }
            seen.push(slot);
            if marker.start() > cursor {
                segments.push(Segment::Literal(&source[cursor..marker.start()]));
            }
            segments.push(Segment::Slot(slot));
            cursor = marker.end();
        }
        if cursor < source.len() {
            segments.push(Segment::Literal(&source[cursor..]));
        }
        if let Some(missing) = Slot::ALL.into_iter().find(|slot| !seen.contains(slot)) {
            return Err(TemplateError::MissingSlot(missing));
        }
        Ok(Self { segments })
    }

    /// Concatenate literals and slot values in template order.
    pub fn render(&self, inputs: &PromptInputs<'_>) -> PromptDocument {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(slot) => out.push_str(inputs.value(*slot)),
            }
        }
        PromptDocument(out)
    }
}

fn slot_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\{\{([a-z_]+)\}\}").expect("valid slot regex"))
}

/// The caller-supplied texts for one compilation.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub spec_text: &'a str,
    pub ruleset: &'a str,
    pub checker_output: &'a str,
    pub agent_text: &'a str,
}

impl PromptInputs<'_> {
    fn value(&self, slot: Slot) -> &str {
        match slot {
            Slot::SpecText => self.spec_text,
            Slot::Ruleset => self.ruleset,
            Slot::CheckerOutput => self.checker_output,
            Slot::AgentText => self.agent_text,
            Slot::ExampleRuleset => example_ruleset(),
            Slot::ConflictExample => conflict_example(),
            Slot::RedundancyExample => redundancy_example(),
        }
    }
}

/// The ruleset both worked examples are drawn from.
pub fn example_ruleset() -> &'static str {
    trim_source(EXAMPLE_RULESET_SLEEC)
}

/// Worked Conflict record and its expected report.
pub fn conflict_example() -> &'static str {
    trim_source(CONFLICT_EXAMPLE_TXT)
}

/// Worked Redundancy record and its expected report.
pub fn redundancy_example() -> &'static str {
    trim_source(REDUNDANCY_EXAMPLE_TXT)
}

fn trim_source(source: &'static str) -> &'static str {
    source.strip_suffix('\n').unwrap_or(source)
}

/// A compiled instruction document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDocument(String);

impl PromptDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PromptDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn rule_rule_template() -> &'static PromptTemplate {
    static TEMPLATE: OnceLock<PromptTemplate> = OnceLock::new();
    TEMPLATE.get_or_init(|| {
        PromptTemplate::parse(RULE_RULE_ANALYSIS_MD).expect("built-in analysis template is valid")
    })
}

/// Compile the rule-rule analysis prompt. Pure: identical inputs give
/// byte-identical documents.
pub fn compile(
    spec_text: &str,
    ruleset: &str,
    checker_output: &str,
    agent_text: &str,
) -> PromptDocument {
    rule_rule_template().render(&PromptInputs {
        spec_text,
        ruleset,
        checker_output,
        agent_text,
    })
}

/// Which conflict classes the user asked to analyse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisScope {
    RuleRuleOnly,
    ModelRuleOnly,
    Both,
    Neither,
}

impl AnalysisScope {
    pub fn from_toggles(rule_rule: bool, model_rule: bool) -> Self {
        match (rule_rule, model_rule) {
            (true, false) => AnalysisScope::RuleRuleOnly,
            (false, true) => AnalysisScope::ModelRuleOnly,
            (true, true) => AnalysisScope::Both,
            (false, false) => AnalysisScope::Neither,
        }
    }

    /// Only rule-rule analysis has a template; the rest short-circuit to
    /// [`UNSUPPORTED_SCOPE_PLACEHOLDER`].
    pub fn is_supported(self) -> bool {
        self == AnalysisScope::RuleRuleOnly
    }

    pub fn describe(self) -> &'static str {
        match self {
            AnalysisScope::RuleRuleOnly => "Analysing Rule-Rule Conflicts",
            AnalysisScope::ModelRuleOnly => "Analysing Model-Rule Conflicts",
            AnalysisScope::Both => "Analysing both Rule-Rule Conflicts and Model-Rule Conflicts",
            AnalysisScope::Neither => "Select an analysis option",
        }
    }
}
