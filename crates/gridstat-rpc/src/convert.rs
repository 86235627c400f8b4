//! Conversions between [`Snapshot`] and its protobuf representation.

use gridstat_core::{ClusterAggregate, InstanceAggregate, Snapshot};

use crate::proto;

pub fn snapshot_to_proto(snapshot: &Snapshot) -> proto::GetMetricsResponse {
    proto::GetMetricsResponse {
        cluster_metrics: snapshot
            .metrics
            .iter()
            .map(|(name, cluster)| (name.clone(), cluster_to_proto(cluster)))
            .collect(),
        collected_at_epoch: snapshot.collected_at,
    }
}

fn cluster_to_proto(cluster: &ClusterAggregate) -> proto::ClusterMetric {
    proto::ClusterMetric {
        instance_metrics: cluster
            .instances
            .iter()
            .map(|(host, agg)| {
                (
                    host.clone(),
                    proto::InstanceMetric {
                        device_metrics: agg.devices.clone(),
                        total: agg.total,
                        average: agg.average,
                        value: agg.value,
                    },
                )
            })
            .collect(),
    }
}

pub fn snapshot_from_proto(resp: proto::GetMetricsResponse) -> Snapshot {
    let metrics = resp
        .cluster_metrics
        .into_iter()
        .map(|(name, cluster)| {
            let instances = cluster
                .instance_metrics
                .into_iter()
                .map(|(host, m)| {
                    (
                        host,
                        InstanceAggregate {
                            devices: m.device_metrics,
                            total: m.total,
                            average: m.average,
                            value: m.value,
                        },
                    )
                })
                .collect();
            (name, ClusterAggregate { instances })
        })
        .collect();

    Snapshot::new(metrics, resp.collected_at_epoch)
}
