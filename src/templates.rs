pub const RULE_RULE_ANALYSIS_MD: &str = include_str!("../prompts/rule_rule_analysis.md");
pub const EXAMPLE_RULESET_SLEEC: &str = include_str!("../prompts/examples/ruleset.sleec");
pub const CONFLICT_EXAMPLE_TXT: &str = include_str!("../prompts/examples/conflict.txt");
pub const REDUNDANCY_EXAMPLE_TXT: &str = include_str!("../prompts/examples/redundancy.txt");
