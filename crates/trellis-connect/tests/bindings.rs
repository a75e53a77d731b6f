//! Integration tests for lazy bindings, per-instance caching and discovery

use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::json;
use trellis_connect::{
    default_registry, Catalogue, Connect, ConnectParams, Connector, ConnectorError, ConnectorRegistry,
    JobDefinition, Result,
};

struct AnimalCatalogue;

impl Catalogue for AnimalCatalogue {
    fn lookup(&self, reference: &str) -> Result<String> {
        match reference {
            "Deadly Animals" => Ok("fake://example.com/deadly".to_string()),
            "Poisonous Animals" => Ok("fake://example.com/poisonous".to_string()),
            other => Err(ConnectorError::Unresolvable(format!("no dataset '{}'", other))),
        }
    }
}

fn registry() -> Arc<ConnectorRegistry> {
    Arc::new(default_registry().with_catalogue(Arc::new(AnimalCatalogue)))
}

fn insects_job() -> Arc<JobDefinition> {
    Arc::new(
        JobDefinition::with_registry("insects", registry())
            .dataset("insects", ConnectParams::engine_url("fake://bugsDB"))
            .dataset("animals", ConnectParams::reference("Deadly Animals"))
            .dataset("pigeons", ConnectParams::engine_url("carrier-pigeon://nowhere")),
    )
}

#[tokio::test]
async fn test_connect_standalone() {
    let insects = Connect::with_registry(ConnectParams::engine_url("fake://bugsDB"), registry());
    let records: Vec<_> = insects.data().await.unwrap().try_collect().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("fake").unwrap(), &json!("data"));
}

#[tokio::test]
async fn test_one_connector_per_binding_per_instance() {
    let job = insects_job();

    let first = job.instantiate();
    let a = first.dataset("insects").unwrap();
    let b = first.dataset("insects").unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let second = job.instantiate();
    let c = second.dataset("insects").unwrap();
    assert!(!Arc::ptr_eq(&a, &c));

    let a_data: Vec<_> = a.data().await.unwrap().try_collect().await.unwrap();
    let c_data: Vec<_> = c.data().await.unwrap().try_collect().await.unwrap();
    assert_eq!(a_data, c_data);
}

#[tokio::test]
async fn test_concurrent_first_reads_share_one_connection() {
    let job = insects_job();
    let instance = Arc::new(job.instantiate());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let instance = instance.clone();
            tokio::task::spawn_blocking(move || instance.dataset("insects").unwrap())
        })
        .collect();
    let mut connections = Vec::new();
    for task in tasks {
        connections.push(task.await.unwrap());
    }
    assert!(connections.iter().all(|c| Arc::ptr_eq(c, &connections[0])));
    assert_eq!(instance.cache().len(), 1);
}

#[test]
fn test_unknown_engine_fails_at_first_access_not_declaration() {
    let job = insects_job();
    let instance = job.instantiate();

    let err = instance.dataset("pigeons").unwrap_err();
    assert!(matches!(err, ConnectorError::UnknownEngine(ref url) if url == "carrier-pigeon://nowhere"));

    // Not cached; the next access fails the same way.
    assert!(matches!(
        instance.dataset("pigeons"),
        Err(ConnectorError::UnknownEngine(_))
    ));
    assert!(instance.dataset("insects").is_ok());
}

#[test]
fn test_discovered_datasets_are_marked() {
    let job = insects_job();
    let instance = job.instantiate();

    let animals = instance.dataset("animals").unwrap();
    assert!(animals.uses_dataset_discovery());
    assert_eq!(animals.engine_url(), "fake://example.com/deadly");
    assert_eq!(
        animals.engine_params()["engine_url"],
        "fake://example.com/deadly"
    );

    let insects = instance.dataset("insects").unwrap();
    assert!(!insects.uses_dataset_discovery());

    let pinned = instance.discovered_engine_params();
    assert_eq!(pinned.keys().collect::<Vec<_>>(), vec!["animals"]);
}

#[test]
fn test_describe_at_definition_level() {
    let job = insects_job();
    let described = job.describe("animals").unwrap();
    assert_eq!(described.reference_name(), Some("Deadly Animals"));
    assert!(described.params().engine_url.is_none());

    let again = job.describe("animals").unwrap();
    assert_ne!(described.id(), again.id());
    assert!(matches!(
        job.describe("nope"),
        Err(ConnectorError::UnknownDataset(_))
    ));
}

#[test]
fn test_overlay_points_a_dataset_elsewhere() {
    let mut job = JobDefinition::with_registry("zoo", registry())
        .dataset("animals", ConnectParams::reference("Deadly Animals"));
    job.overlay("animals", ConnectParams::reference("Poisonous Animals"))
        .unwrap();
    let job = Arc::new(job);

    let animals = job.instantiate().dataset("animals").unwrap();
    assert_eq!(animals.engine_url(), "fake://example.com/poisonous");
}

#[test]
fn test_spare_options_rejected_at_access() {
    let job = Arc::new(JobDefinition::with_registry("opts", registry()).dataset(
        "insects",
        ConnectParams::engine_url("fake://foo").with_option("doesntexist", "oh dear"),
    ));
    assert!(matches!(
        job.instantiate().dataset("insects"),
        Err(ConnectorError::InvalidParameter(_))
    ));
}
