//! Metrics definitions for the gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "requests",
    metric_type: MetricType::Counter,
    description: "Number of handled requests. Tagged with route and status.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with route.",
};

pub const UPSTREAM_ATTEMPTS: MetricDef = MetricDef {
    name: "upstream.attempts",
    metric_type: MetricType::Counter,
    description: "Number of POSTs sent to upstream candidate paths. Tagged with outcome.",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a single upstream attempt in seconds. Tagged with outcome.",
};

pub const RECORDS_SAVED: MetricDef = MetricDef {
    name: "records.saved",
    metric_type: MetricType::Counter,
    description: "Number of workout records accepted into the in-memory store",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUESTS,
    REQUEST_DURATION,
    UPSTREAM_ATTEMPTS,
    UPSTREAM_DURATION,
    RECORDS_SAVED,
];
