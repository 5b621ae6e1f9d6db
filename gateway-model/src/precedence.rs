use gateway_model_core::route::RouteDescriptor;
use std::cmp::Ordering;

/// Orders routes so that routes with more specific hostnames come first,
/// returning references and leaving the input untouched.
///
/// Each route is represented by its most specific hostname. Exact hostnames
/// precede wildcards; routes without hostnames come last. The sort is
/// stable, so routes of equal precedence keep their relative order.
pub fn sorted(routes: &[RouteDescriptor]) -> Vec<&RouteDescriptor> {
    let mut sorted = routes.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| compare(a, b));
    sorted
}

fn compare(a: &RouteDescriptor, b: &RouteDescriptor) -> Ordering {
    match (a.representative_hostname(), b.representative_hostname()) {
        (Some(a), Some(b)) => a.precedence_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
