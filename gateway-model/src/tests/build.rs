use super::fakes::{self, Collaborators};
use crate::{
    config::{Feature, FeatureGates},
    routes, BuildInput, BuildOutput, BuilderConfig, RoutesByPort,
};
use gateway_model_core::{
    elbv2::{
        Action, IpAddressType, LoadBalancerType, Protocol, RuleCondition, Scheme,
        WeightedTargetGroup,
    },
    route::{IpFamily, PathMatch, RouteKind, RouteMatch},
    Error, ResourceKind, ResourceRef, StringToken,
};
use gateway_model_k8s_api::{
    gateway::{Gateway, HttpRoute},
    LoadBalancerConfigurationSpec,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn mk_input<'i>(
    gateway: &'i Gateway,
    config: &'i LoadBalancerConfigurationSpec,
    routes: &'i RoutesByPort,
    secrets: &'i Collaborators,
) -> BuildInput<'i> {
    BuildInput {
        gateway,
        config,
        routes,
        addons: &[],
        secrets,
    }
}

async fn build(
    config: BuilderConfig,
    collaborators: &Arc<Collaborators>,
    input: BuildInput<'_>,
) -> Result<BuildOutput, Error> {
    let builder = fakes::mk_builder(config, collaborators);
    builder.build(input, &CancellationToken::new()).await
}

fn nlb() -> BuilderConfig {
    BuilderConfig {
        load_balancer_type: LoadBalancerType::Network,
        ..BuilderConfig::default()
    }
}

fn single_route() -> RoutesByPort {
    let backends = vec![fakes::mk_backend("ns", "svc", 8080)];
    let route = fakes::mk_route("ns", "r1", &["a.example.com"], backends);
    fakes::on_port(80, vec![route])
}

#[tokio::test]
async fn builds_an_internal_ipv4_stack() {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec::default();
    let routes = single_route();
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect("build must succeed");

    let (_, lb) = output.stack.load_balancer().unwrap();
    assert_eq!(lb.lb_type, LoadBalancerType::Application);
    assert_eq!(lb.scheme, Scheme::Internal);
    assert_eq!(lb.ip_address_type, IpAddressType::Ipv4);
    assert_eq!(
        lb.subnet_mappings
            .iter()
            .map(|m| m.subnet_id.as_str())
            .collect::<Vec<_>>(),
        fakes::SUBNETS
    );
    assert!(output.backend_sg_allocated);

    let target_groups = output.stack.target_groups().collect::<Vec<_>>();
    assert_eq!(target_groups.len(), 1);
    let (tg_id, tg) = target_groups[0];
    assert_eq!(tg_id.as_str(), "ns/gw1:HTTPRoute:ns/svc:8080");
    assert_eq!(tg.port.get(), 8080);
    assert_eq!(output.stack.target_group_bindings().count(), 1);

    let listeners = output.stack.listeners().collect::<Vec<_>>();
    assert_eq!(listeners.len(), 1);
    let (listener_id, listener) = listeners[0];
    assert_eq!(listener_id.as_str(), "80");
    assert_eq!(listener.protocol, Protocol::Http);
    let lb_ref = output.load_balancer.as_ref().unwrap();
    assert_eq!(
        listener.load_balancer,
        StringToken::field(lb_ref, StringToken::LOAD_BALANCER_ARN)
    );
    assert_eq!(listener.rules.len(), 1);
    assert_eq!(
        listener.rules[0].conditions,
        vec![RuleCondition::HostHeader {
            values: vec!["a.example.com".to_string()],
        }]
    );
    let tg_ref = ResourceRef {
        kind: ResourceKind::TargetGroup,
        id: tg_id.clone(),
    };
    assert_eq!(
        listener.rules[0].actions,
        vec![Action::Forward {
            target_groups: vec![WeightedTargetGroup {
                target_group: StringToken::field(&tg_ref, StringToken::TARGET_GROUP_ARN),
                weight: 1,
            }],
        }]
    );

    assert!(output.addons.is_empty());
    assert!(output.secrets.is_empty());
}

#[tokio::test]
async fn builds_are_deterministic() {
    let gateway = fakes::mk_gateway(
        "ns",
        "gw1",
        vec![
            fakes::http_listener(80),
            fakes::https_listener("https", 443, Some("a.example.com"), "cert"),
        ],
    );
    let tags = [("team".to_string(), "edge".to_string())];
    let config = LoadBalancerConfigurationSpec {
        tags: Some(tags.into_iter().collect()),
        ..Default::default()
    };
    let mut routes = single_route();
    let wildcard = vec![fakes::mk_backend("ns", "b", 80)];
    let catch_all = vec![fakes::mk_backend("ns", "c", 80)];
    routes.extend(fakes::on_port(
        443,
        vec![
            fakes::mk_route("ns", "r2", &["*.example.com"], wildcard),
            fakes::mk_route("ns", "r3", &[], catch_all),
        ],
    ));
    let collaborators = Collaborators::new();
    let builder = fakes::mk_builder(BuilderConfig::default(), &collaborators);
    let cancel = CancellationToken::new();

    let input = mk_input(&gateway, &config, &routes, &collaborators);
    let first = builder
        .build(input, &cancel)
        .await
        .expect("build must succeed");
    let second = builder
        .build(input, &cancel)
        .await
        .expect("build must succeed");

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("output must serialize"),
        serde_json::to_string(&second).expect("output must serialize"),
    );
}

#[tokio::test]
async fn routes_to_the_same_backend_share_a_target_group() {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec::default();
    let backends = vec![fakes::mk_backend("ns", "svc", 8080)];
    let routes = fakes::on_port(
        80,
        vec![
            fakes::mk_route("ns", "r1", &["a.example.com"], backends.clone()),
            fakes::mk_route("ns", "r2", &["b.example.com"], backends),
        ],
    );
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect("build must succeed");

    assert_eq!(output.stack.target_groups().count(), 1);
    assert_eq!(output.stack.target_group_bindings().count(), 1);
    let (_, listener) = output.stack.listeners().next().unwrap();
    assert_eq!(listener.rules.len(), 2);
    assert_eq!(listener.rules[0].actions, listener.rules[1].actions);
}

#[tokio::test]
async fn rules_follow_route_precedence() {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec::default();

    let backends = vec![fakes::mk_backend("ns", "b", 80)];
    let mut prefixed = fakes::mk_route("ns", "prefixed", &["*.example.com"], backends);
    prefixed.rules[0].matches = vec![
        RouteMatch {
            path: Some(PathMatch::Prefix("/api".to_string())),
            ..Default::default()
        },
        RouteMatch {
            path: Some(PathMatch::Exact("/healthz".to_string())),
            ..Default::default()
        },
    ];
    let backends = vec![fakes::mk_backend("ns", "a", 80)];
    let exact = fakes::mk_route("ns", "exact", &["a.example.com"], backends);
    let routes = fakes::on_port(80, vec![prefixed, exact]);
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect("build must succeed");

    let (_, listener) = output.stack.listeners().next().unwrap();
    let rules = listener
        .rules
        .iter()
        .map(|r| (r.priority, r.route.name.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(rules, vec![(1, "exact"), (2, "prefixed"), (3, "prefixed")]);
    assert_eq!(
        listener.rules[1].conditions,
        vec![
            RuleCondition::HostHeader {
                values: vec!["*.example.com".to_string()],
            },
            RuleCondition::PathPattern {
                values: vec!["/api".to_string(), "/api/*".to_string()],
            },
        ]
    );
}

#[tokio::test]
async fn rules_without_backends_respond_unavailable() {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec::default();
    let routes = fakes::on_port(80, vec![fakes::mk_route("ns", "r1", &[], vec![])]);
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect("build must succeed");

    assert_eq!(output.stack.target_groups().count(), 0);
    let (_, listener) = output.stack.listeners().next().unwrap();
    assert_eq!(
        listener.rules[0].actions,
        vec![Action::FixedResponse {
            status_code: 503,
            content_type: "text/plain".to_string(),
        }]
    );
    assert_eq!(
        listener.default_actions,
        vec![Action::FixedResponse {
            status_code: 404,
            content_type: "text/plain".to_string(),
        }]
    );
}

#[rstest]
#[case::scheme(Some("public"), None)]
#[case::ip_address_type(None, Some("ipv5"))]
#[tokio::test]
async fn rejects_unknown_addressing(
    #[case] scheme: Option<&str>,
    #[case] ip_address_type: Option<&str>,
) {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec {
        scheme: scheme.map(str::to_string),
        ip_address_type: ip_address_type.map(str::to_string),
        ..Default::default()
    };
    let routes = single_route();
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let error = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect_err("build must fail");

    assert!(matches!(error, Error::InvalidEnum { .. }), "{error}");
    assert!(collaborators.calls().is_empty());
}

#[tokio::test]
async fn explicit_addressing_overrides_defaults() {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec {
        scheme: Some("internet-facing".to_string()),
        ip_address_type: Some("dualstack".to_string()),
        ..Default::default()
    };
    let routes = single_route();
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect("build must succeed");

    let (_, lb) = output.stack.load_balancer().unwrap();
    assert_eq!(lb.scheme, Scheme::InternetFacing);
    assert_eq!(lb.ip_address_type, IpAddressType::DualStack);
}

#[tokio::test]
async fn weighted_forwarding_is_feature_gated() {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec::default();
    let backends = vec![
        fakes::mk_backend("ns", "a", 80),
        fakes::mk_backend("ns", "b", 80),
    ];
    let routes = fakes::on_port(80, vec![fakes::mk_route("ns", "r1", &[], backends)]);
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect("build must succeed");
    assert_eq!(output.stack.target_groups().count(), 2);

    let gates = FeatureGates::default().with(Feature::WeightedTargetGroups, false);
    let config_gated = BuilderConfig {
        feature_gates: gates,
        ..BuilderConfig::default()
    };
    let error = build(config_gated, &collaborators, input)
        .await
        .expect_err("build must fail");
    assert!(matches!(error, Error::InvalidConfig(_)), "{error}");
}

#[tokio::test]
async fn later_target_group_failures_abort_the_build() {
    let gateway = fakes::mk_gateway("ns", "gw1", vec![fakes::http_listener(80)]);
    let config = LoadBalancerConfigurationSpec::default();
    let mut ipv6 = fakes::mk_backend("ns", "v6", 80);
    ipv6.ip_family = IpFamily::Ipv6;
    let backends = vec![fakes::mk_backend("ns", "v4", 80), ipv6];
    let routes = fakes::on_port(80, vec![fakes::mk_route("ns", "r1", &[], backends)]);
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let error = build(BuilderConfig::default(), &collaborators, input)
        .await
        .expect_err("build must fail");

    let Error::InvalidConfig(message) = &error else {
        panic!("unexpected error: {error}");
    };
    assert!(message.contains("ns/gw1:HTTPRoute:ns/v6:80"), "{message}");
    assert!(message.contains("dual-stack"), "{message}");
}

#[tokio::test]
async fn network_listeners_forward_to_the_first_route() {
    let gateway = fakes::mk_gateway(
        "ns",
        "gw1",
        vec![
            fakes::listener("tcp", 9000, "TCP"),
            fakes::listener("idle", 9001, "TCP"),
        ],
    );
    let config = LoadBalancerConfigurationSpec::default();
    let backends = vec![fakes::mk_backend("ns", "db", 5432)];
    let mut route = fakes::mk_route("ns", "r1", &[], backends);
    route.kind = RouteKind::Tcp;
    let routes = fakes::on_port(9000, vec![route]);
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(nlb(), &collaborators, input)
        .await
        .expect("build must succeed");

    let listeners = output.stack.listeners().collect::<Vec<_>>();
    assert_eq!(listeners.len(), 1);
    let (_, listener) = listeners[0];
    assert_eq!(listener.protocol, Protocol::Tcp);
    assert!(listener.rules.is_empty());
    assert!(matches!(
        listener.default_actions.as_slice(),
        [Action::Forward { target_groups }] if target_groups.len() == 1
    ));
    let (_, tg) = output.stack.target_groups().next().unwrap();
    assert_eq!(tg.protocol, Protocol::Tcp);
}

#[tokio::test]
async fn skipped_listeners_report_no_secrets() {
    let listeners = vec![fakes::tls_listener("tls", 443, "cert")];
    let gateway = fakes::mk_gateway("ns", "gw1", listeners);
    let config = LoadBalancerConfigurationSpec::default();
    let routes = RoutesByPort::new();
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);

    let output = build(nlb(), &collaborators, input)
        .await
        .expect("build must succeed");

    assert_eq!(output.stack.listeners().count(), 0);
    assert!(output.secrets.is_empty(), "{:?}", output.secrets);
}

#[tokio::test]
async fn http_routes_ignore_network_listeners() {
    let listeners = vec![fakes::listener("tcp", 9000, "TCP")];
    let gateway = fakes::mk_gateway("ns", "gw1", listeners);
    let route = serde_yaml::from_str::<HttpRoute>(
        r#"
apiVersion: gateway.networking.k8s.io/v1beta1
kind: HTTPRoute
metadata: { name: r1, namespace: ns }
spec:
  parentRefs:
    - { name: gw1, sectionName: tcp }
    - { name: gw1, port: 9000 }
  rules:
    - backendRefs: [{ name: db, port: 5432 }]
"#,
    )
    .expect("route must parse");
    let routes = routes::attach(&gateway, [&route]).expect("routes must attach");
    assert!(routes.is_empty(), "{routes:?}");

    let config = LoadBalancerConfigurationSpec::default();
    let collaborators = Collaborators::new();
    let input = mk_input(&gateway, &config, &routes, &collaborators);
    let output = build(nlb(), &collaborators, input)
        .await
        .expect("build must succeed");
    assert_eq!(output.stack.listeners().count(), 0);
    assert_eq!(output.stack.target_groups().count(), 0);
}
