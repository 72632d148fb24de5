// Copyright (C) 2017 Hove and/or its affiliates.
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, version 3.

// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.

// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>

//! Consumption of realtime messages by generations of the model.
//!
//! The published model is never modified: a batch of messages is applied
//! on a clone of the current generation which then replaces it. Readers
//! holding a previous generation keep it untouched.

use crate::apply_disruption::apply_disruption;
use crate::configuration::Config;
use crate::delete_disruption::delete_disruption;
use crate::disruption::Disruption;
use crate::model::Model;
use crate::trip_update::{apply_trip_update, TripUpdate};
use crate::Result;
use skip_error::skip_error_and_warn;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Content of a realtime message
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum RealtimeMessage {
    Disruption(Disruption),
    /// Uri of the disruption to delete
    DisruptionDeletion(String),
    TripUpdate(TripUpdate),
}

/// A message of a realtime feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Messages with the same id replace each other
    pub id: String,
    #[allow(missing_docs)]
    pub payload: RealtimeMessage,
}

/// Messages in reverse order of arrival, keeping only the most recent one
/// for each id.
pub fn deduplicate(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Message> = messages
        .into_iter()
        .rev()
        .filter(|message| seen.insert(message.id.clone()))
        .collect();
    unique.shrink_to_fit();
    unique
}

/// Apply a batch of messages on the model. Messages of contributors not
/// accepted by the configuration are dropped, so are the messages that
/// fail. Returns the number of messages applied.
pub fn apply_messages(model: &mut Model, messages: Vec<Message>, config: &Config) -> usize {
    let mut applied = 0;
    for message in deduplicate(messages) {
        match message.payload {
            RealtimeMessage::Disruption(disruption) => {
                if !config.accepts(&disruption.contributor) {
                    debug!(
                        "disruption '{}' of contributor '{}' ignored",
                        disruption.uri, disruption.contributor
                    );
                    continue;
                }
                skip_error_and_warn!(apply_disruption(model, disruption));
            }
            RealtimeMessage::DisruptionDeletion(uri) => {
                skip_error_and_warn!(delete_disruption(model, &uri));
            }
            RealtimeMessage::TripUpdate(trip_update) => {
                if !config.accepts(&trip_update.contributor) {
                    debug!(
                        "trip update '{}' of contributor '{}' ignored",
                        trip_update.id, trip_update.contributor
                    );
                    continue;
                }
                skip_error_and_warn!(apply_trip_update(model, &trip_update));
            }
        }
        applied += 1;
    }
    applied
}

/// The published generation of the model.
///
/// Writers are serialized: a generation is always built from the one
/// published just before it.
#[derive(Clone)]
pub struct LiveModel {
    current: Arc<RwLock<Arc<Model>>>,
    writer: Arc<Mutex<()>>,
}

impl LiveModel {
    /// Publish `model` as the first generation.
    pub fn new(model: Model) -> Self {
        LiveModel {
            current: Arc::new(RwLock::new(Arc::new(model))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// The current generation, unaffected by later publications.
    pub async fn snapshot(&self) -> Arc<Model> {
        self.current.read().await.clone()
    }

    /// Replace the current generation.
    pub async fn publish(&self, model: Model) {
        let _writer = self.writer.lock().await;
        self.replace(model).await;
    }

    async fn replace(&self, model: Model) {
        *self.current.write().await = Arc::new(model);
    }

    /// Apply a batch of messages on a copy of the current generation, then
    /// publish it. Returns the number of messages applied.
    pub async fn apply_batch(&self, messages: Vec<Message>, config: &Config) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot().await;
        let mut next = (*snapshot).clone();
        let applied = apply_messages(&mut next, messages, config);
        next.check_consistency()?;
        self.replace(next).await;
        info!("new generation of the model published, {} messages applied", applied);
        Ok(applied)
    }
}

/// Future of a pull of messages
pub type FetchResult = Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send>>;

/// A feed of realtime messages
pub trait FeedSource: Send + Sync + 'static {
    /// Pull at most `max_messages` pending messages, in order of arrival
    fn fetch(&self, max_messages: usize) -> FetchResult;
}

/// Pull messages from a feed and publish the new generations of a model.
pub struct RealtimeConsumer<F: FeedSource> {
    live_model: LiveModel,
    source: Arc<F>,
    config: Config,
}

impl<F: FeedSource> RealtimeConsumer<F> {
    #[allow(missing_docs)]
    pub fn new(live_model: LiveModel, source: F, config: Config) -> Self {
        RealtimeConsumer {
            live_model,
            source: Arc::new(source),
            config,
        }
    }

    /// Pull messages, retrying on failure with a delay doubling up to
    /// the configured maximum.
    async fn fetch_with_retry(&self) -> Vec<Message> {
        let mut attempt = 0;
        loop {
            match self.source.fetch(self.config.max_batch_size).await {
                Ok(messages) => return messages,
                Err(e) => {
                    let delay = self.config.retry_interval(attempt);
                    error!("realtime feed failed: {:#}, retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Pull one batch of messages and publish the resulting generation.
    /// Returns the number of messages applied.
    pub async fn consume_once(&self) -> Result<usize> {
        let messages = self.fetch_with_retry().await;
        if messages.is_empty() {
            return Ok(0);
        }
        info!("{} realtime messages received", messages.len());
        self.live_model.apply_batch(messages, &self.config).await
    }

    /// Consume the feed in the background, every `poll_interval_secs`.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = self.consume_once().await {
                    error!("realtime batch dropped: {:#}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruption::{Effect, Impact, Informed, Severity};
    use crate::model_builder::ModelBuilder;
    use crate::objects::RTLevel;
    use crate::time_periods::TimePeriod;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn model() -> Model {
        ModelBuilder::default()
            .vj("vj:1", |vj| {
                vj.st("A", "08:00:00", "08:00:00")
                    .st("B", "08:15:00", "08:15:00")
                    .st("C", "08:45:00", "08:45:00");
            })
            .build()
    }

    fn disruption(uri: &str, contributor: &str, stop_area: &str) -> Message {
        let period = TimePeriod::new(
            "2020-01-01T00:00:00".parse().unwrap(),
            "2020-01-10T00:00:00".parse().unwrap(),
        )
        .unwrap();
        let impact = Impact {
            uri: format!("{}:impact", uri),
            disruption_uri: String::new(),
            severity: Severity {
                effect: Effect::ReducedService,
                ..Default::default()
            },
            application_periods: vec![period],
            application_patterns: vec![],
            informed_entities: vec![Informed::StopArea(stop_area.to_owned())],
            aux_info: None,
        };
        Message {
            id: uri.to_owned(),
            payload: RealtimeMessage::Disruption(
                Disruption::new(uri, contributor, RTLevel::Adapted, period, vec![impact]).unwrap(),
            ),
        }
    }

    fn deletion(uri: &str) -> Message {
        Message {
            id: uri.to_owned(),
            payload: RealtimeMessage::DisruptionDeletion(uri.to_owned()),
        }
    }

    #[test]
    fn most_recent_message_wins() {
        let messages = deduplicate(vec![
            disruption("d1", "chaos", "sa:B"),
            disruption("d2", "chaos", "sa:B"),
            deletion("d1"),
        ]);
        assert_eq!(vec![deletion("d1"), disruption("d2", "chaos", "sa:B")], messages);
    }

    #[test]
    fn messages_of_other_contributors_are_ignored() {
        let mut model = model();
        let config = Config {
            contributors: vec!["chaos".to_owned()],
            ..Default::default()
        };
        let applied = apply_messages(
            &mut model,
            vec![
                disruption("d1", "chaos", "sa:B"),
                disruption("d2", "other", "sa:C"),
            ],
            &config,
        );
        assert_eq!(1, applied);
        assert!(model.disruptions().contains("d1"));
        assert!(!model.disruptions().contains("d2"));
    }

    #[tokio::test]
    async fn readers_keep_their_generation() {
        let live_model = LiveModel::new(model());
        let before = live_model.snapshot().await;
        let applied = live_model
            .apply_batch(vec![disruption("d1", "chaos", "sa:B")], &Config::default())
            .await
            .unwrap();
        assert_eq!(1, applied);
        assert_eq!(1, before.vehicle_journeys.len());
        assert!(before.disruptions().is_empty());
        let after = live_model.snapshot().await;
        assert_eq!(2, after.vehicle_journeys.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_batches_are_all_kept() {
        let live_model = LiveModel::new(model());
        let batches: Vec<_> = (0..8)
            .map(|i| {
                let live_model = live_model.clone();
                let stop_area = if i % 2 == 0 { "sa:B" } else { "sa:C" };
                tokio::spawn(async move {
                    live_model
                        .apply_batch(
                            vec![disruption(&format!("d{}", i), "chaos", stop_area)],
                            &Config::default(),
                        )
                        .await
                })
            })
            .collect();
        for batch in batches {
            assert_eq!(1, batch.await.unwrap().unwrap());
        }
        let model = live_model.snapshot().await;
        for i in 0..8 {
            assert!(model.disruptions().contains(&format!("d{}", i)));
        }
        model.check_consistency().unwrap();
    }

    struct FlakySource {
        calls: Arc<AtomicUsize>,
        failures: usize,
    }

    impl FeedSource for FlakySource {
        fn fetch(&self, _max_messages: usize) -> FetchResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.failures;
            Box::pin(async move {
                if call < failures {
                    anyhow::bail!("connection refused");
                }
                if call == failures {
                    Ok(vec![disruption("d1", "chaos", "sa:B")])
                } else {
                    Ok(vec![])
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn feed_failures_are_retried() {
        let live_model = LiveModel::new(model());
        let calls = Arc::new(AtomicUsize::new(0));
        let consumer = RealtimeConsumer::new(
            live_model.clone(),
            FlakySource {
                calls: calls.clone(),
                failures: 3,
            },
            Config::default(),
        );
        let start = tokio::time::Instant::now();
        assert_eq!(1, consumer.consume_once().await.unwrap());
        assert_eq!(4, calls.load(Ordering::SeqCst));
        // 1 + 2 + 4 seconds of retry
        assert_eq!(Duration::from_secs(7), start.elapsed());
        assert!(live_model.snapshot().await.disruptions().contains("d1"));
    }

    #[tokio::test(start_paused = true)]
    async fn background_consumer_polls_the_feed() {
        let live_model = LiveModel::new(model());
        let calls = Arc::new(AtomicUsize::new(0));
        let consumer = RealtimeConsumer::new(
            live_model.clone(),
            FlakySource {
                calls: calls.clone(),
                failures: 0,
            },
            Config::default(),
        );
        let handle = consumer.start();
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(2, live_model.snapshot().await.vehicle_journeys.len());
        handle.abort();
    }
}
