//! Topic to credential registry.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use feedwire_auth::{AuthError, CredentialSource, SourceId, TokenResolver};
use futures_util::future::join_all;

/// Topics sharing one resolved token, sent as a single LISTEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendBatch {
    pub token: Option<String>,
    pub topics: Vec<String>,
}

/// Topics whose credential source could not be resolved.
#[derive(Debug)]
pub struct ResendFailure {
    pub topics: Vec<String>,
    pub error: AuthError,
}

/// Result of grouping the registry for a reconnect replay.
#[derive(Debug, Default)]
pub struct ResendPlan {
    pub batches: Vec<ResendBatch>,
    pub failures: Vec<ResendFailure>,
}

impl ResendPlan {
    pub fn topic_count(&self) -> usize {
        self.batches.iter().map(|b| b.topics.len()).sum()
    }
}

/// The set of topics the caller wants, each with the source of its token.
///
/// A topic maps to exactly one source; registering it again replaces the
/// previous source.
#[derive(Debug, Default, Clone)]
pub struct TopicRegistry {
    topics: BTreeMap<String, CredentialSource>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-registers) topics under one source.
    pub fn set<I, S>(&mut self, topics: I, source: &CredentialSource)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for topic in topics {
            self.topics.insert(topic.into(), source.clone());
        }
    }

    /// Removes topics. Unknown topics are ignored.
    pub fn delete<I, S>(&mut self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for topic in topics {
            self.topics.remove(topic.as_ref());
        }
    }

    pub fn has(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Registered topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    /// Groups topics by source identity. Groups come out in order of their
    /// first (sorted) topic.
    pub fn sources_by_identity(&self) -> Vec<(CredentialSource, Vec<String>)> {
        let mut index: HashMap<SourceId, usize> = HashMap::new();
        let mut groups: Vec<(CredentialSource, Vec<String>)> = Vec::new();
        for (topic, source) in &self.topics {
            let slot = *index.entry(source.identity()).or_insert_with(|| {
                groups.push((source.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(topic.clone());
        }
        groups
    }

    /// Builds the replay plan for a fresh connection.
    ///
    /// The registry is snapshotted synchronously; the returned future owns
    /// everything it needs. Every distinct source is resolved once, all
    /// concurrently, and groups that resolve to the same token are merged
    /// into one batch. A source that fails to resolve only affects its own
    /// topics.
    pub fn group_for_resend(
        &self,
        resolver: &TokenResolver,
    ) -> impl Future<Output = ResendPlan> + Send + use<> {
        let groups = self.sources_by_identity();
        let resolver = resolver.clone();
        async move {
            let resolved = join_all(groups.into_iter().map(|(source, topics)| {
                let resolver = resolver.clone();
                async move { (resolver.resolve(&source).await, topics) }
            }))
            .await;

            let mut by_token: BTreeMap<Option<String>, Vec<String>> = BTreeMap::new();
            let mut failures = Vec::new();
            for (result, topics) in resolved {
                match result {
                    Ok(token) => by_token.entry(token).or_default().extend(topics),
                    Err(error) => failures.push(ResendFailure { topics, error }),
                }
            }

            let batches = by_token
                .into_iter()
                .map(|(token, mut topics)| {
                    topics.sort();
                    ResendBatch { token, topics }
                })
                .collect();
            ResendPlan { batches, failures }
        }
    }
}
