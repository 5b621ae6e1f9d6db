use crate::{
    config::Feature,
    precedence,
    resolvers::{self, SecretResolver},
    target_group::{TargetGroupBuilder, TargetGroupContext, TargetGroupRegistry},
    BuilderConfig, RoutesByPort,
};
use gateway_model_core::{
    elbv2::{
        Action, IpAddressType, ListenerRule, ListenerSpec, LoadBalancerType, Protocol,
        RuleCondition, WeightedTargetGroup,
    },
    route::{BackendRef, PathMatch, RouteDescriptor, RouteKind, RouteMatch, Value},
    Component, Error, NamespacedName, ResourceRef, Stack, StringToken,
};
use gateway_model_k8s_api::{gateway::Gateway, LoadBalancerConfigurationSpec};
use std::{collections::BTreeMap, num::NonZeroU16};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builds a listener for each port a gateway listens on, along with the
/// target groups its rules forward to.
pub struct ListenerBuilder<'b> {
    config: &'b BuilderConfig,
    target_groups: TargetGroupBuilder<'b>,
}

pub struct ListenerInput<'i> {
    pub gateway: &'i Gateway,
    pub gateway_name: &'i NamespacedName,
    pub config: &'i LoadBalancerConfigurationSpec,
    pub routes: &'i RoutesByPort,
    pub load_balancer: &'i ResourceRef,
    pub ip_address_type: IpAddressType,
    pub backend_sg: Option<&'i StringToken>,
    pub secrets: &'i dyn SecretResolver,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerOutput {
    pub listeners: Vec<ResourceRef>,

    /// Secrets referenced by TLS listeners, in the order they were first
    /// referenced.
    pub secrets: Vec<NamespacedName>,
}

/// The gateway listeners that share a port, merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayPort {
    pub protocol: Protocol,

    /// Hostnames that requests must match when a route declares none. Empty
    /// when any hostname is accepted.
    pub hostnames: Vec<String>,

    pub certificate_refs: Vec<NamespacedName>,
}

const CONTENT_TYPE: &str = "text/plain";

// === impl ListenerBuilder ===

impl<'b> ListenerBuilder<'b> {
    pub fn new(config: &'b BuilderConfig, target_groups: TargetGroupBuilder<'b>) -> Self {
        Self {
            config,
            target_groups,
        }
    }

    pub async fn build(
        &self,
        stack: &mut Stack,
        input: ListenerInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<ListenerOutput, Error> {
        let lb_type = self.config.load_balancer_type;
        let ports = gateway_ports(input.gateway, &input.gateway_name.namespace, lb_type)?;
        for port in input.routes.keys().filter(|p| !ports.contains_key(*p)) {
            debug!(%port, "Ignoring routes for a port the gateway does not listen on");
        }

        let cx = TargetGroupContext {
            gateway: input.gateway_name,
            config: input.config,
            ip_address_type: input.ip_address_type,
            backend_sg: input.backend_sg,
        };
        let mut registry = TargetGroupRegistry::default();
        let mut output = ListenerOutput::default();

        for (port, gw_port) in ports {
            let tls = self.tls(&input, port, &gw_port, cancel).await?;

            let routes = input.routes.get(&port).map(Vec::as_slice);
            let routes = precedence::sorted(routes.unwrap_or_default());
            if let Some(route) = routes.iter().find(|r| !accepts(gw_port.protocol, r.kind)) {
                return Err(Error::invalid_config(format!(
                    "{} {} cannot attach to {} listener on port {port}",
                    route.kind, route.name, gw_port.protocol
                )));
            }

            let (default_actions, rules) = match lb_type {
                LoadBalancerType::Application => {
                    let rules = self.rules(stack, &mut registry, cx, &gw_port, &routes)?;
                    (vec![fixed_response(404)], rules)
                }
                LoadBalancerType::Network => {
                    match self.network_action(stack, &mut registry, cx, port, &routes)? {
                        Some(action) => (vec![action], Vec::new()),
                        None => {
                            debug!(%port, "Skipping listener without backends");
                            continue;
                        }
                    }
                }
            };

            let spec = ListenerSpec {
                load_balancer: StringToken::field(
                    input.load_balancer,
                    StringToken::LOAD_BALANCER_ARN,
                ),
                port,
                protocol: gw_port.protocol,
                default_actions,
                certificates: tls.certificates,
                ssl_policy: tls.ssl_policy,
                alpn_policy: tls.alpn_policy,
                rules,
            };
            let listener = stack.add_resource(port.to_string(), spec)?;
            debug!(%port, protocol = %gw_port.protocol, "Registered listener");
            output.listeners.push(listener);
            for secret in tls.secrets {
                if !output.secrets.contains(&secret) {
                    output.secrets.push(secret);
                }
            }
        }

        Ok(output)
    }

    async fn tls(
        &self,
        input: &ListenerInput<'_>,
        port: NonZeroU16,
        gw_port: &GatewayPort,
        cancel: &CancellationToken,
    ) -> Result<Tls, Error> {
        let protocol = gw_port.protocol;
        if !protocol.is_tls() {
            return Ok(Tls::default());
        }

        let mut certificates = Vec::new();
        for secret in &gw_port.certificate_refs {
            let arn = resolvers::call(
                cancel,
                Component::Secrets,
                input
                    .secrets
                    .certificate_arn(secret, &self.config.allowed_ca_arns),
            )
            .await?;
            certificates.push(arn);
        }

        let listener_config = input.config.listener(protocol.as_str(), port.get());
        certificates.extend(
            listener_config
                .into_iter()
                .flat_map(|lc| lc.certificate_arns())
                .map(str::to_string),
        );
        let mut seen = ahash::AHashSet::new();
        certificates.retain(|arn| seen.insert(arn.clone()));
        if certificates.is_empty() {
            return Err(Error::invalid_config(format!(
                "{protocol} listener on port {port} has no certificates"
            )));
        }

        let ssl_policy = listener_config
            .and_then(|lc| lc.ssl_policy.clone())
            .unwrap_or_else(|| self.config.default_ssl_policy.clone());
        let alpn_policy = match protocol {
            Protocol::Tls => listener_config.and_then(|lc| lc.alpn_policy.clone()),
            _ => None,
        };

        Ok(Tls {
            certificates,
            ssl_policy: Some(ssl_policy),
            alpn_policy,
            secrets: gw_port.certificate_refs.clone(),
        })
    }

    /// Builds routing rules for an application listener. Rules are numbered
    /// in route precedence order.
    fn rules(
        &self,
        stack: &mut Stack,
        registry: &mut TargetGroupRegistry,
        cx: TargetGroupContext<'_>,
        gw_port: &GatewayPort,
        routes: &[&RouteDescriptor],
    ) -> Result<Vec<ListenerRule>, Error> {
        let mut rules = Vec::new();
        for route in routes {
            let hostnames = if route.hostnames.is_empty() {
                gw_port.hostnames.clone()
            } else {
                route.hostnames.iter().map(ToString::to_string).collect()
            };

            for rule in &route.rules {
                let action = self
                    .forward(stack, registry, cx, route, &rule.backends)?
                    .unwrap_or_else(|| fixed_response(503));

                let matches = if rule.matches.is_empty() {
                    vec![None]
                } else {
                    rule.matches.iter().map(Some).collect()
                };
                for m in matches {
                    rules.push(ListenerRule {
                        priority: rules.len() as u32 + 1,
                        conditions: conditions(&hostnames, m, route)?,
                        actions: vec![action.clone()],
                        route: route.name.clone(),
                    });
                }
            }
        }
        Ok(rules)
    }

    /// A network listener forwards all traffic to the backends of the first
    /// rule of its highest-precedence route.
    fn network_action(
        &self,
        stack: &mut Stack,
        registry: &mut TargetGroupRegistry,
        cx: TargetGroupContext<'_>,
        port: NonZeroU16,
        routes: &[&RouteDescriptor],
    ) -> Result<Option<Action>, Error> {
        let Some((route, ignored)) = routes.split_first() else {
            return Ok(None);
        };
        for r in ignored {
            debug!(%port, route = %r.name, "Ignoring lower-precedence route");
        }

        let backends = route
            .rules
            .first()
            .map(|rule| rule.backends.as_slice())
            .unwrap_or_default();
        self.forward(stack, registry, cx, route, backends)
    }

    /// Builds a forward action to the target groups of `backends`, or `None`
    /// if there are no backends.
    fn forward(
        &self,
        stack: &mut Stack,
        registry: &mut TargetGroupRegistry,
        cx: TargetGroupContext<'_>,
        route: &RouteDescriptor,
        backends: &[BackendRef],
    ) -> Result<Option<Action>, Error> {
        if backends.is_empty() {
            return Ok(None);
        }
        if backends.len() > 1
            && !self
                .config
                .feature_gates
                .enabled(Feature::WeightedTargetGroups)
        {
            return Err(Error::invalid_config(format!(
                "{} {} forwards to {} backends but feature gate {} is disabled",
                route.kind,
                route.name,
                backends.len(),
                Feature::WeightedTargetGroups
            )));
        }

        let mut target_groups = Vec::<WeightedTargetGroup>::with_capacity(backends.len());
        for backend in backends {
            let tg = self
                .target_groups
                .target_group(stack, registry, cx, route, backend)?;
            let token = StringToken::field(&tg, StringToken::TARGET_GROUP_ARN);
            let existing = target_groups.iter_mut().find(|w| w.target_group == token);
            match existing {
                Some(wtg) => wtg.weight += backend.weight,
                None => target_groups.push(WeightedTargetGroup {
                    target_group: token,
                    weight: backend.weight,
                }),
            }
        }
        Ok(Some(Action::Forward { target_groups }))
    }
}

#[derive(Debug, Default)]
struct Tls {
    certificates: Vec<String>,
    ssl_policy: Option<String>,
    alpn_policy: Option<String>,

    /// Secrets the certificates were resolved from. Reported only once the
    /// listener is registered.
    secrets: Vec<NamespacedName>,
}

/// Merges a gateway's listeners by port, in ascending port order.
pub fn gateway_ports(
    gateway: &Gateway,
    namespace: &str,
    lb_type: LoadBalancerType,
) -> Result<BTreeMap<NonZeroU16, GatewayPort>, Error> {
    let mut ports = BTreeMap::<NonZeroU16, (GatewayPort, bool)>::new();
    for listener in &gateway.spec.listeners {
        let port = NonZeroU16::new(listener.port).ok_or_else(|| {
            Error::invalid_config(format!("listener {} has no port", listener.name))
        })?;
        let protocol = listener
            .protocol
            .parse::<Protocol>()
            .ok()
            .filter(|p| p.supported_by(lb_type))
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "listener {}: protocol {} is not supported by {lb_type} load balancers",
                    listener.name, listener.protocol
                ))
            })?;

        let (gw_port, any_host) = ports.entry(port).or_insert_with(|| {
            let gw_port = GatewayPort {
                protocol,
                hostnames: Vec::new(),
                certificate_refs: Vec::new(),
            };
            (gw_port, false)
        });
        if gw_port.protocol != protocol {
            return Err(Error::invalid_config(format!(
                "listeners on port {port} disagree on protocol: {} and {protocol}",
                gw_port.protocol
            )));
        }

        match listener.hostname.as_deref() {
            Some(hostname) => {
                let hostname = hostname.to_ascii_lowercase();
                if !gw_port.hostnames.contains(&hostname) {
                    gw_port.hostnames.push(hostname);
                }
            }
            None => *any_host = true,
        }

        let refs = listener
            .tls
            .iter()
            .flat_map(|tls| tls.certificate_refs.iter().flatten());
        for cert in refs {
            let group = cert.group.as_deref().unwrap_or_default();
            let kind = cert.kind.as_deref().unwrap_or("Secret");
            if !(group.is_empty() || group.eq_ignore_ascii_case("core")) || kind != "Secret" {
                debug!(
                    listener = %listener.name,
                    %kind,
                    name = %cert.name,
                    "Ignoring certificate reference"
                );
                continue;
            }
            let namespace = cert.namespace.as_deref().unwrap_or(namespace);
            let secret = NamespacedName::new(namespace, &cert.name);
            if !gw_port.certificate_refs.contains(&secret) {
                gw_port.certificate_refs.push(secret);
            }
        }
    }

    Ok(ports
        .into_iter()
        .map(|(port, (mut gw_port, any_host))| {
            if any_host {
                gw_port.hostnames.clear();
            }
            (port, gw_port)
        })
        .collect())
}

/// Indicates whether routes of `kind` may attach to a listener speaking
/// `protocol`.
pub(crate) fn accepts(protocol: Protocol, kind: RouteKind) -> bool {
    match protocol {
        Protocol::Http | Protocol::Https => kind.is_l7(),
        Protocol::Tcp => kind == RouteKind::Tcp,
        Protocol::Udp => kind == RouteKind::Udp,
        Protocol::Tls => matches!(kind, RouteKind::Tcp | RouteKind::Tls),
        Protocol::TcpUdp => matches!(kind, RouteKind::Tcp | RouteKind::Udp),
    }
}

fn fixed_response(status_code: u16) -> Action {
    Action::FixedResponse {
        status_code,
        content_type: CONTENT_TYPE.to_string(),
    }
}

fn conditions(
    hostnames: &[String],
    m: Option<&RouteMatch>,
    route: &RouteDescriptor,
) -> Result<Vec<RuleCondition>, Error> {
    let mut conditions = Vec::new();
    if !hostnames.is_empty() {
        conditions.push(RuleCondition::HostHeader {
            values: hostnames.to_vec(),
        });
    }

    if let Some(m) = m {
        if let Some(path) = &m.path {
            conditions.push(RuleCondition::PathPattern {
                values: path_patterns(path, route)?,
            });
        }

        for header in &m.headers {
            match &header.value {
                Value::Exact(value) => conditions.push(RuleCondition::HttpHeader {
                    name: header.name.clone(),
                    values: vec![value.clone()],
                }),
                Value::Regex(_) => {
                    return Err(Error::invalid_config(format!(
                        "{} {}: regular expression header matches are not supported",
                        route.kind, route.name
                    )));
                }
            }
        }

        if let Some(method) = &m.method {
            conditions.push(RuleCondition::HttpRequestMethod {
                values: vec![method.to_ascii_uppercase()],
            });
        }

        if !m.query_params.is_empty() {
            let mut values = Vec::with_capacity(m.query_params.len());
            for param in &m.query_params {
                match &param.value {
                    Value::Exact(value) => values.push((param.name.clone(), value.clone())),
                    Value::Regex(_) => {
                        return Err(Error::invalid_config(format!(
                            "{} {}: regular expression query parameter matches are not supported",
                            route.kind, route.name
                        )));
                    }
                }
            }
            conditions.push(RuleCondition::QueryString { values });
        }
    }

    // Every rule needs at least one condition.
    if conditions.is_empty() {
        conditions.push(RuleCondition::PathPattern {
            values: vec!["/*".to_string()],
        });
    }

    Ok(conditions)
}

fn path_patterns(path: &PathMatch, route: &RouteDescriptor) -> Result<Vec<String>, Error> {
    match path {
        PathMatch::Exact(path) => Ok(vec![path.clone()]),
        PathMatch::Prefix(prefix) => {
            let prefix = prefix.trim_end_matches('/');
            if prefix.is_empty() {
                return Ok(vec!["/*".to_string()]);
            }
            Ok(vec![prefix.to_string(), format!("{prefix}/*")])
        }
        PathMatch::Regex(_) => Err(Error::invalid_config(format!(
            "{} {}: regular expression path matches are not supported",
            route.kind, route.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes;
    use gateway_model_core::route::HeaderMatch;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn mk_route() -> RouteDescriptor {
        RouteDescriptor::new(RouteKind::Http, NamespacedName::new("ns", "r"))
    }

    #[rstest]
    #[case(PathMatch::Exact("/foo".to_string()), vec!["/foo"])]
    #[case(PathMatch::Prefix("/".to_string()), vec!["/*"])]
    #[case(PathMatch::Prefix("/foo".to_string()), vec!["/foo", "/foo/*"])]
    #[case(PathMatch::Prefix("/foo/".to_string()), vec!["/foo", "/foo/*"])]
    fn converts_paths_to_patterns(#[case] path: PathMatch, #[case] expected: Vec<&str>) {
        assert_eq!(path_patterns(&path, &mk_route()).unwrap(), expected);
    }

    #[test]
    fn rejects_regular_expressions() {
        let regex_path = RouteMatch {
            path: Some(PathMatch::Regex("/v[0-9]+".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            conditions(&[], Some(&regex_path), &mk_route()),
            Err(Error::InvalidConfig(_))
        ));

        let regex_header = RouteMatch {
            headers: vec![HeaderMatch {
                name: "x-version".to_string(),
                value: Value::Regex("v.*".to_string()),
            }],
            ..Default::default()
        };
        assert!(matches!(
            conditions(&[], Some(&regex_header), &mk_route()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rules_without_conditions_match_every_path() {
        assert_eq!(
            conditions(&[], None, &mk_route()).unwrap(),
            vec![RuleCondition::PathPattern {
                values: vec!["/*".to_string()],
            }]
        );
    }

    #[test]
    fn merges_gateway_listeners_by_port() {
        let gateway = fakes::mk_gateway(
            "ns",
            "gw1",
            vec![
                fakes::https_listener("a", 443, Some("A.example.com"), "cert-a"),
                fakes::https_listener("b", 443, Some("b.example.com"), "cert-b"),
                fakes::http_listener(80),
            ],
        );
        let ports = gateway_ports(&gateway, "ns", LoadBalancerType::Application).unwrap();
        assert_eq!(
            ports.keys().map(|p| p.get()).collect::<Vec<_>>(),
            vec![80, 443]
        );

        let https = &ports[&NonZeroU16::new(443).unwrap()];
        assert_eq!(https.protocol, Protocol::Https);
        assert_eq!(https.hostnames, vec!["a.example.com", "b.example.com"]);
        assert_eq!(
            https.certificate_refs,
            vec![
                NamespacedName::new("ns", "cert-a"),
                NamespacedName::new("ns", "cert-b"),
            ]
        );
    }

    #[rstest]
    #[case::mixed_protocols(vec![fakes::http_listener(80), fakes::listener("x", 80, "HTTPS")])]
    #[case::unsupported_protocol(vec![fakes::listener("tcp", 9000, "TCP")])]
    #[case::unknown_protocol(vec![fakes::listener("x", 9000, "SCTP")])]
    fn rejects_invalid_gateway_listeners(#[case] listeners: Vec<serde_json::Value>) {
        let gateway = fakes::mk_gateway("ns", "gw1", listeners);
        let err = gateway_ports(&gateway, "ns", LoadBalancerType::Application).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
    }

    #[rstest]
    #[case(Protocol::Http, RouteKind::Grpc, true)]
    #[case(Protocol::Http, RouteKind::Tcp, false)]
    #[case(Protocol::Tls, RouteKind::Tls, true)]
    #[case(Protocol::Udp, RouteKind::Tcp, false)]
    #[case(Protocol::TcpUdp, RouteKind::Udp, true)]
    fn listeners_accept_matching_route_kinds(
        #[case] protocol: Protocol,
        #[case] kind: RouteKind,
        #[case] expected: bool,
    ) {
        assert_eq!(accepts(protocol, kind), expected);
    }
}
