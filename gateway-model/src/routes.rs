//! Converts Gateway API routes into route descriptors.

use crate::{listener, RoutesByPort};
use gateway_model_core::{
    elbv2::Protocol,
    route::{
        BackendRef, HeaderMatch, PathMatch, QueryParamMatch, RouteDescriptor, RouteKind,
        RouteMatch, RouteRule, Value,
    },
    Error, HostMatch, NamespacedName,
};
use gateway_model_k8s_api::{
    gateway::{self as api, Gateway},
    ResourceExt,
};
use std::{collections::BTreeSet, num::NonZeroU16};
use tracing::debug;

const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

pub fn from_http_route(route: &api::HttpRoute) -> Result<RouteDescriptor, Error> {
    let namespace = route.namespace().ok_or_else(|| {
        Error::invalid_config(format!("HTTPRoute {} has no namespace", route.name_any()))
    })?;
    let name = NamespacedName::new(&namespace, route.name_any());

    let mut descriptor = RouteDescriptor::new(RouteKind::Http, name);
    descriptor.hostnames = route
        .spec
        .hostnames
        .iter()
        .flatten()
        .map(|h| HostMatch::parse(h))
        .collect();

    for rule in route.spec.rules.iter().flatten() {
        let matches = rule.matches.iter().flatten().map(convert_match).collect();

        let mut backends = Vec::new();
        for backend in rule.backend_refs.iter().flatten() {
            if let Some(backend) = convert_backend(&namespace, &descriptor.name, backend)? {
                backends.push(backend);
            }
        }

        descriptor.rules.push(RouteRule { matches, backends });
    }

    Ok(descriptor)
}

/// Groups routes by the gateway ports they attach to.
///
/// A route attaches through each of its parent references that names the
/// gateway, to the listeners the reference selects by port or section name
/// (every listener when it names neither). Only HTTP and HTTPS listeners
/// accept routes.
pub fn attach<'r>(
    gateway: &Gateway,
    routes: impl IntoIterator<Item = &'r api::HttpRoute>,
) -> Result<RoutesByPort, Error> {
    let gw_namespace = gateway.namespace().unwrap_or_default();
    let gw_name = gateway.name_any();

    let mut by_port = RoutesByPort::new();
    for route in routes {
        let route_namespace = route.namespace().unwrap_or_default();
        let mut ports = BTreeSet::new();
        for parent in route.spec.inner.parent_refs.iter().flatten() {
            let group = parent.group.as_deref().unwrap_or(GATEWAY_GROUP);
            let kind = parent.kind.as_deref().unwrap_or("Gateway");
            let namespace = parent.namespace.as_deref().unwrap_or(&route_namespace);
            if group != GATEWAY_GROUP
                || kind != "Gateway"
                || namespace != gw_namespace
                || parent.name != gw_name
            {
                continue;
            }

            let listeners = gateway.spec.listeners.iter().filter(|l| {
                let section = parent.section_name.as_ref().map_or(true, |s| *s == l.name);
                let port = parent.port.map_or(true, |p| p == l.port);
                section && port
            });
            for l in listeners {
                let protocol = l.protocol.parse::<Protocol>();
                if !protocol.is_ok_and(|p| listener::accepts(p, RouteKind::Http)) {
                    debug!(
                        route = %route.name_any(),
                        listener = %l.name,
                        protocol = %l.protocol,
                        "Listener does not accept HTTP routes"
                    );
                    continue;
                }
                ports.extend(NonZeroU16::new(l.port));
            }
        }

        if ports.is_empty() {
            debug!(route = %route.name_any(), "Route does not attach to the gateway");
            continue;
        }

        let descriptor = from_http_route(route)?;
        for port in ports {
            by_port.entry(port).or_default().push(descriptor.clone());
        }
    }
    Ok(by_port)
}

fn convert_match(m: &api::HttpRouteMatch) -> RouteMatch {
    let path = m.path.as_ref().map(|path| match path {
        api::HttpPathMatch::Exact { value } => PathMatch::Exact(value.clone()),
        api::HttpPathMatch::PathPrefix { value } => PathMatch::Prefix(value.clone()),
        api::HttpPathMatch::RegularExpression { value } => PathMatch::Regex(value.clone()),
    });

    let headers = m
        .headers
        .iter()
        .flatten()
        .map(|header| match header {
            api::HttpHeaderMatch::Exact { name, value } => HeaderMatch {
                name: name.clone(),
                value: Value::Exact(value.clone()),
            },
            api::HttpHeaderMatch::RegularExpression { name, value } => HeaderMatch {
                name: name.clone(),
                value: Value::Regex(value.clone()),
            },
        })
        .collect();

    let query_params = m
        .query_params
        .iter()
        .flatten()
        .map(|param| match param {
            api::HttpQueryParamMatch::Exact { name, value } => QueryParamMatch {
                name: name.clone(),
                value: Value::Exact(value.clone()),
            },
            api::HttpQueryParamMatch::RegularExpression { name, value } => QueryParamMatch {
                name: name.clone(),
                value: Value::Regex(value.clone()),
            },
        })
        .collect();

    RouteMatch {
        path,
        headers,
        query_params,
        method: m.method.clone(),
    }
}

/// Converts a Service backend reference. Other kinds of backends are
/// skipped.
fn convert_backend(
    namespace: &str,
    route: &NamespacedName,
    backend: &api::HttpBackendRef,
) -> Result<Option<BackendRef>, Error> {
    let Some(backend) = backend.backend_ref.as_ref() else {
        return Ok(None);
    };
    if !is_service(&backend.inner) {
        debug!(
            %route,
            group = backend.inner.group.as_deref().unwrap_or("core"),
            kind = backend.inner.kind.as_deref().unwrap_or_default(),
            name = %backend.inner.name,
            "Skipping unsupported backend"
        );
        return Ok(None);
    }

    // Port is required when the referent is a Kubernetes Service.
    let port = backend
        .inner
        .port
        .and_then(NonZeroU16::new)
        .ok_or_else(|| {
            Error::invalid_config(format!(
                "HTTPRoute {route}: missing port for backend Service {}",
                backend.inner.name
            ))
        })?;

    let service = NamespacedName::new(
        backend.inner.namespace.as_deref().unwrap_or(namespace),
        &backend.inner.name,
    );
    let mut backend_ref = BackendRef::new(service, port);
    backend_ref.weight = backend.weight.map_or(1, u32::from);
    Ok(Some(backend_ref))
}

fn is_service(backend: &api::BackendObjectReference) -> bool {
    // An unset or empty group is the core group; an unset kind is a Service.
    let group = backend.group.as_deref().unwrap_or_default();
    let kind = backend.kind.as_deref().unwrap_or("Service");
    (group.is_empty() || group.eq_ignore_ascii_case("core")) && kind.eq_ignore_ascii_case("Service")
}
