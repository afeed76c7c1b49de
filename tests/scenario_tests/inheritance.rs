//! Stories about registers flowing from an Organization to its Deployments

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;

use org_registry::controller::{
    TimeoutPolicy, ORGANIZATION_LABEL, ORGANIZATION_NOT_FOUND, RECONCILE_PERIOD, SHORT_WAIT,
    VERY_SHORT_WAIT,
};
use org_registry::crd::{
    AddressAllocationStrategy, AdminState, ConditionStatus, ManagedResource, OperState,
    RegisterKind,
};
use org_registry::Error;

use super::fixtures::{
    deployment, organization, resolved, Harness, RecordingDialer, NAMESPACE,
};

fn full_org() -> org_registry::crd::Organization {
    organization(
        "acme",
        &[
            (RegisterKind::Ipam, "P"),
            (RegisterKind::As, "Q"),
            (RegisterKind::Ni, "R"),
        ],
    )
}

/// Story: an operator creates an Organization with every mandatory register,
/// then a Deployment that overrides only IPAM.
#[tokio::test]
async fn story_deployment_inherits_what_it_does_not_set() {
    let harness = Harness::new();
    let mut org = full_org();
    org.spec.properties.address_allocation_strategy = Some(AddressAllocationStrategy {
        type_: Some("per-org".to_string()),
        prefix_length: Some(16),
    });
    harness.store.put_organization(org);
    harness
        .store
        .put_deployment(deployment("acme.dep1", &[(RegisterKind::Ipam, "X")]));

    // The organization converges first and gets its namespace
    let action = harness.converge_organization("acme").await.unwrap();
    assert_eq!(action, Action::requeue(RECONCILE_PERIOD));
    assert_eq!(*harness.namespaces.ensured.lock(), vec!["acme".to_string()]);

    let org = harness.store.organization("acme").unwrap();
    assert_eq!(org.status(), OperState::Up);
    let status = org.status.as_ref().unwrap();
    assert_eq!(status.conditions[0].status, ConditionStatus::True);
    assert_eq!(status.observed_generation, Some(1));

    // The deployment keeps its own ipam and takes as/ni from the parent
    harness.converge_deployment("acme.dep1").await.unwrap();
    let dep = harness.store.deployment("acme.dep1").unwrap();
    assert_eq!(dep.status(), OperState::Up);
    let register = resolved(&dep);
    assert_eq!(register[&RegisterKind::Ipam], "X");
    assert_eq!(register[&RegisterKind::As], "Q");
    assert_eq!(register[&RegisterKind::Ni], "R");
    assert_eq!(
        dep.resolved_allocation_strategy().unwrap().type_.as_deref(),
        Some("per-org")
    );
    assert_eq!(
        dep.labels().get(ORGANIZATION_LABEL).map(String::as_str),
        Some("acme")
    );
}

/// Story: an Organization without `ni` still comes up, but its Deployments
/// cannot resolve until the operator adds it.
#[tokio::test]
async fn story_missing_critical_register_recovers_after_parent_update() {
    let harness = Harness::new();
    harness.store.put_organization(organization(
        "acme",
        &[(RegisterKind::Ipam, "P"), (RegisterKind::As, "Q")],
    ));
    harness.store.put_deployment(deployment("acme.dep1", &[]));

    harness.converge_organization("acme").await.unwrap();
    assert_eq!(
        harness.store.organization("acme").unwrap().status(),
        OperState::Up
    );

    let err = harness.converge_deployment("acme.dep1").await.unwrap_err();
    assert!(matches!(err, Error::CriticalRegisterMissing { kind: RegisterKind::Ni }));
    let dep = harness.store.deployment("acme.dep1").unwrap();
    assert_eq!(dep.status(), OperState::Down);
    assert_eq!(dep.reason(), "critical register ni not found in registry");
    assert!(resolved(&dep).is_empty());
    let health = &dep.status.as_ref().unwrap().health;
    assert_eq!(health.percentage, 0);

    // The operator adds ni; the organization change requeues the deployment
    harness.store.update_organization("acme", |org| {
        org.spec
            .properties
            .register
            .push(org_registry::crd::Register::new(RegisterKind::Ni, "R"));
    });
    harness.reconcile_organization("acme").await.unwrap();
    harness.reconcile_deployment("acme.dep1").await.unwrap();

    let dep = harness.store.deployment("acme.dep1").unwrap();
    assert_eq!(dep.status(), OperState::Up);
    assert_eq!(dep.reason(), "");
    assert_eq!(resolved(&dep)[&RegisterKind::Ni], "R");
    let health = &dep.status.as_ref().unwrap().health;
    assert_eq!(health.percentage, 100);
    assert!(health.reason.is_none());
}

/// Story: a Deployment created before its Organization reports the missing
/// parent and converges once the parent shows up.
#[tokio::test]
async fn story_deployment_waits_for_its_organization() {
    let harness = Harness::new();
    harness.store.put_deployment(deployment("acme.dep1", &[]));

    let err = harness.converge_deployment("acme.dep1").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    let dep = harness.store.deployment("acme.dep1").unwrap();
    assert_eq!(dep.status(), OperState::Down);
    assert_eq!(dep.reason(), ORGANIZATION_NOT_FOUND);

    harness.store.put_organization(full_org());
    harness.converge_organization("acme").await.unwrap();
    harness.reconcile_deployment("acme.dep1").await.unwrap();

    assert_eq!(
        harness.store.deployment("acme.dep1").unwrap().status(),
        OperState::Up
    );
}

/// Story: the operator drops the organization's allocation strategy and
/// neither the organization nor its deployments keep serving the old one.
#[tokio::test]
async fn story_dropped_strategy_is_cleared_downstream() {
    let harness = Harness::new();
    let mut org = full_org();
    org.spec.properties.address_allocation_strategy = Some(AddressAllocationStrategy {
        type_: Some("per-org".to_string()),
        prefix_length: Some(24),
    });
    harness.store.put_organization(org);
    harness.store.put_deployment(deployment("acme.dep1", &[]));
    harness.converge_organization("acme").await.unwrap();
    harness.converge_deployment("acme.dep1").await.unwrap();

    let locator = harness.locator(Vec::new(), Arc::new(RecordingDialer::default()));
    let strategy = locator
        .get_address_allocation_strategy(NAMESPACE, "acme.dep1")
        .await
        .unwrap();
    assert_eq!(strategy.unwrap().prefix_length, Some(24));

    harness.store.update_organization("acme", |org| {
        org.spec.properties.address_allocation_strategy = None;
    });
    harness.reconcile_organization("acme").await.unwrap();
    harness.reconcile_deployment("acme.dep1").await.unwrap();

    for name in ["acme", "acme.dep1"] {
        let strategy = locator
            .get_address_allocation_strategy(NAMESPACE, name)
            .await
            .unwrap();
        assert!(strategy.is_none(), "{name} kept a stale strategy");
    }
}

/// Story: an operator disables an Organization; it stops serving registers
/// and its deployments can no longer inherit from it.
#[tokio::test]
async fn story_disabled_organization_stops_serving() {
    let harness = Harness::new();
    harness.store.put_organization(full_org());
    harness.store.put_deployment(deployment("acme.dep1", &[]));
    harness.converge_organization("acme").await.unwrap();
    harness.converge_deployment("acme.dep1").await.unwrap();

    harness.store.update_organization("acme", |org| {
        org.spec.properties.admin_state = Some(AdminState::Disable);
    });
    harness.reconcile_organization("acme").await.unwrap();

    let org = harness.store.organization("acme").unwrap();
    assert_eq!(org.status(), OperState::Down);
    assert_eq!(org.reason(), "admin state disabled");
    assert!(resolved(&org).is_empty());

    let locator = harness.locator(Vec::new(), Arc::new(RecordingDialer::default()));
    let err = locator.get_register(NAMESPACE, "acme").await.unwrap_err();
    assert!(matches!(
        err,
        Error::CriticalRegisterMissing {
            kind: RegisterKind::Ipam
        }
    ));

    let err = harness.reconcile_deployment("acme.dep1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::CriticalRegisterMissing {
            kind: RegisterKind::Ipam
        }
    ));
    let dep = harness.store.deployment("acme.dep1").unwrap();
    assert_eq!(dep.status(), OperState::Down);
    assert!(resolved(&dep).is_empty());
}

/// Story: an operator disables a Deployment; it goes down regardless of its
/// organization, and its previous resolution is dropped.
#[tokio::test]
async fn story_disabled_deployment_goes_down() {
    let harness = Harness::new();
    harness.store.put_organization(full_org());
    harness.store.put_deployment(deployment("acme.dep1", &[]));
    harness.converge_organization("acme").await.unwrap();
    harness.converge_deployment("acme.dep1").await.unwrap();

    let mut dep = harness.store.deployment("acme.dep1").unwrap();
    dep.spec.properties.admin_state = Some(AdminState::Disable);
    dep.metadata.generation = Some(2);
    harness.store.put_deployment(dep);
    harness.reconcile_deployment("acme.dep1").await.unwrap();

    let dep = harness.store.deployment("acme.dep1").unwrap();
    assert_eq!(dep.status(), OperState::Down);
    assert_eq!(dep.reason(), "admin state disabled");
    assert!(resolved(&dep).is_empty());
    assert_eq!(dep.status.unwrap().observed_generation, Some(2));
}

/// Story: deployments of other organizations in the same namespace are not
/// affected by a neighbour's registers.
#[tokio::test]
async fn story_neighbouring_organizations_stay_separate() {
    let harness = Harness::new();
    harness.store.put_organization(full_org());
    harness.store.put_organization(organization(
        "globex",
        &[
            (RegisterKind::Ipam, "G1"),
            (RegisterKind::As, "G2"),
            (RegisterKind::Ni, "G3"),
        ],
    ));
    harness.store.put_deployment(deployment("globex.dep1", &[]));

    harness.converge_organization("acme").await.unwrap();
    harness.converge_organization("globex").await.unwrap();
    harness.converge_deployment("globex.dep1").await.unwrap();

    let dep = harness.store.deployment("globex.dep1").unwrap();
    assert_eq!(dep.namespace().as_deref(), Some(NAMESPACE));
    assert_eq!(resolved(&dep)[&RegisterKind::Ipam], "G1");
}

/// Story: with the opt-in fast retry, a new Deployment is revisited quickly
/// before settling on the steady period.
#[tokio::test]
async fn story_fast_retry_ladder() {
    let harness = Harness::with_policy(TimeoutPolicy::fast_retry());
    harness.store.put_organization(full_org());
    harness.store.put_deployment(deployment("acme.dep1", &[]));
    harness.converge_organization("acme").await.unwrap();

    let first = harness.converge_deployment("acme.dep1").await.unwrap();
    assert_eq!(first, Action::requeue(VERY_SHORT_WAIT));
    let mut delays = Vec::new();
    for _ in 0..3 {
        delays.push(harness.reconcile_deployment("acme.dep1").await.unwrap());
    }
    assert_eq!(
        delays,
        vec![
            Action::requeue(SHORT_WAIT),
            Action::requeue(SHORT_WAIT),
            Action::requeue(RECONCILE_PERIOD),
        ]
    );
}
