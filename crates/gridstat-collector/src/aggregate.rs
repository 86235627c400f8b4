//! Per-host grouping and summary statistics.

use gridstat_core::{ClusterAggregate, MetricDefinition, Sample};

/// Group `samples` by host and summarize them under `definition`.
///
/// With a device label each sample lands in its host's device map under
/// [`MetricDefinition::device_key`]; without one it sets the host's scalar
/// value. Later samples overwrite earlier ones for the same key.
pub fn aggregate(definition: &MetricDefinition, samples: &[Sample]) -> ClusterAggregate {
    let mut report = ClusterAggregate::default();

    for sample in samples {
        let instance = report.instances.entry(sample.host.clone()).or_default();
        let scaled = definition.scale_value(sample.value);

        match (&definition.device_label, &sample.device) {
            (Some(_), device) => {
                let key = definition.device_key(device.as_deref().unwrap_or_default());
                instance.devices.insert(key, scaled);
            }
            (None, _) => instance.value = scaled,
        }
    }

    for instance in report.instances.values_mut() {
        instance.summarize();
    }
    report
}
