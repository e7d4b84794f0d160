use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::fmt;

/// Prometheus metrics for recipe sync and suggestions
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    // Counters
    pub recipe_events_total: IntCounterVec,
    pub suggestion_requests_total: IntCounterVec,

    // Histograms
    pub recipe_event_duration_seconds: HistogramVec,
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let recipe_events_total = IntCounterVec::new(
            Opts::new("mealplanner_recipe_events_total", "Recipe events settled by the consumer"),
            &["outcome"], // acked|requeued|dead_lettered|settle_failed
        )?;

        let suggestion_requests_total = IntCounterVec::new(
            Opts::new("mealplanner_suggestion_requests_total", "Suggestion requests served"),
            &["result"], // ok|error
        )?;

        let recipe_event_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mealplanner_recipe_event_duration_seconds",
                "Time to process and settle one recipe event",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(recipe_events_total.clone()))?;
        registry.register(Box::new(suggestion_requests_total.clone()))?;
        registry.register(Box::new(recipe_event_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            recipe_events_total,
            suggestion_requests_total,
            recipe_event_duration_seconds,
        })
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
