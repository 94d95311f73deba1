//! Collaborators shared by every node of the graph.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use tracing::debug;
use waypoint_config::AppConfig;
use waypoint_core::clock::offset_from_hours;
use waypoint_core::{Clock, EventBus, Generator, IntentClassifier};
use waypoint_rules::RuleEngine;
use waypoint_telemetry::{Span, TelemetryEngine};
use waypoint_tools::ToolGateway;

use crate::generator::OfflineGenerator;
use crate::nlu::{KeywordClassifier, Lexicon};
use crate::WorkflowError;

pub struct Services {
    pub tools: ToolGateway,
    pub rules: Arc<RuleEngine>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub generator: Arc<dyn Generator>,
    pub lexicon: Arc<Lexicon>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<AppConfig>,
    pub events: Arc<EventBus>,
    /// `None` when telemetry is disabled.
    pub telemetry: Option<Arc<TelemetryEngine>>,
}

impl Services {
    /// Wire the built-in collaborators: offline tools, configured rules,
    /// keyword classifier and the offline generator.
    pub fn from_config(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, WorkflowError> {
        let config = Arc::new(config);
        let events = Arc::new(EventBus::default());
        let lexicon = Arc::new(Lexicon::new()?);
        let offset = offset_from_hours(config.utc_offset_hours);

        Ok(Self {
            tools: ToolGateway::from_config(&config.tools).with_event_bus(events.clone()),
            rules: Arc::new(RuleEngine::from_config(&config, clock.clone())?),
            classifier: Arc::new(KeywordClassifier::new(lexicon.clone(), clock.clone(), offset)),
            generator: Arc::new(OfflineGenerator),
            lexicon,
            clock,
            telemetry: TelemetryEngine::from_config(&config.telemetry).map(Arc::new),
            events,
            config,
        })
    }

    pub fn with_tools(mut self, tools: ToolGateway) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_rules(mut self, rules: Arc<RuleEngine>) -> Self {
        self.rules = rules;
        self
    }

    pub fn offset(&self) -> FixedOffset {
        offset_from_hours(self.config.utc_offset_hours)
    }

    /// The local calendar date, used to resolve relative dates.
    pub fn today(&self) -> NaiveDate {
        self.clock.today(self.offset())
    }

    pub(crate) fn record_span(&self, trace_id: Option<&str>, span: Span) {
        let (Some(engine), Some(trace_id)) = (&self.telemetry, trace_id) else {
            return;
        };
        if let Err(e) = engine.record_span(trace_id, span) {
            debug!(error = %e, "Span dropped");
        }
    }
}
