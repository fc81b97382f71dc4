// Default keyword catalogue offered to the operator UI.

use serde::Serialize;

use crate::types::Keyword;

#[derive(Debug, Clone, Serialize)]
pub struct Topic {
    pub name: &'static str,
    /// Relevance credited for each of this topic's keywords found in a record.
    pub weight: f64,
    pub keywords: &'static [&'static str],
}

/// Relevance credited for a keyword match: its topic's weight, or 1.0 for
/// operator-entered keywords outside the catalogue.
pub fn topic_weight(topic: Option<&str>) -> f64 {
    topic
        .and_then(|name| default_topics().into_iter().find(|t| t.name == name))
        .map_or(DEFAULT_KEYWORD_WEIGHT, |t| t.weight)
}

const DEFAULT_KEYWORD_WEIGHT: f64 = 1.0;

impl Topic {
    pub fn to_keywords(&self) -> Vec<Keyword> {
        self.keywords
            .iter()
            .map(|k| Keyword::new(*k).in_topic(self.name))
            .collect()
    }
}

const AGENT_CONNECTIVITY: &[&str] = &[
    "agent to agent",
    "A2A protocol",
    "MCP",
    "multi-agent communication",
    "agent messaging",
    "inter-agent",
    "agent network",
    "agent coordination",
    "agent orchestration",
    "agent workflow",
    "agent collaboration",
    "cross-agent",
    "agent bridge",
    "agent proxy",
    "agent middleware",
    "agent bus",
];

const AGENT_DISCOVERY: &[&str] = &[
    "agent registry",
    "agent discovery",
    "fleet management",
    "agent marketplace",
    "agent directory",
    "service discovery",
    "agent catalog",
    "agent inventory",
    "agent lookup",
    "agent routing",
    "agent broker",
    "agent mesh",
    "dynamic agent discovery",
    "agent topology",
    "agent federation",
];

const AGENT_IDENTITY: &[&str] = &[
    "agent identity",
    "agent authentication",
    "zero trust agents",
    "agent authorization",
    "agent credentials",
    "agent security",
    "agent access control",
    "agent PKI",
    "agent certificates",
    "agent tokens",
    "agent permissions",
    "agent roles",
    "agent delegation",
    "agent trust",
    "agent verification",
    "agent compliance",
];

pub fn default_topics() -> Vec<Topic> {
    vec![
        Topic {
            name: "agent_connectivity",
            weight: 2.0,
            keywords: AGENT_CONNECTIVITY,
        },
        Topic {
            name: "agent_discovery",
            weight: 1.8,
            keywords: AGENT_DISCOVERY,
        },
        Topic {
            name: "agent_identity",
            weight: 1.5,
            keywords: AGENT_IDENTITY,
        },
    ]
}
