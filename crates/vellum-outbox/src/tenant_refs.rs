//! Multi-representation tenant reference resolution.
//!
//! Historical data mixes three spellings of the same tenant: the hyphenated
//! UUID, the simple (hyphenless) UUID, and the tenant slug. The resolver
//! expands any one of them into the full set so registry queries match every
//! row that refers to the tenant, whichever form it was written with.
//!
//! Lookups are memoized per tenant in a bounded in-memory cache; at tenant
//! scale a full clear on overflow is cheaper than an eviction policy.

use std::collections::HashMap;
use std::sync::Mutex;

use sqlx::PgPool;
use uuid::Uuid;

use vellum_db::models::Tenant;

/// Upper bound on memoized tenants before the cache is cleared.
const CACHE_CAPACITY: usize = 1024;

/// Expands one tenant reference into all equivalent representations.
pub struct TenantRefResolver {
    pool: PgPool,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl TenantRefResolver {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a tenant reference into every representation seen in the data:
    /// hyphenated UUID, simple UUID, and slug.
    ///
    /// Unknown references resolve to their syntactic forms only; the set
    /// always contains the input itself.
    pub async fn expand(&self, tenant_ref: &str) -> Result<Vec<String>, sqlx::Error> {
        if let Some(cached) = self.cache_get(tenant_ref) {
            return Ok(cached);
        }

        let mut refs = syntactic_forms(tenant_ref);

        // Resolve the slug half: UUID input looks up the slug, slug input
        // looks up the UUID forms.
        if let Ok(id) = Uuid::parse_str(tenant_ref) {
            if let Some(tenant) = Tenant::find_by_id(&self.pool, id).await? {
                push_unique(&mut refs, tenant.slug);
            }
        } else if let Some(tenant) = Tenant::find_by_slug(&self.pool, tenant_ref).await? {
            push_unique(&mut refs, tenant.id.hyphenated().to_string());
            push_unique(&mut refs, tenant.id.simple().to_string());
        }

        self.cache_put(tenant_ref, &refs);
        Ok(refs)
    }

    fn cache_get(&self, key: &str) -> Option<Vec<String>> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    fn cache_put(&self, key: &str, refs: &[String]) {
        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() >= CACHE_CAPACITY {
                cache.clear();
            }
            cache.insert(key.to_string(), refs.to_vec());
        }
    }
}

/// The representations derivable from the reference alone, input first.
fn syntactic_forms(tenant_ref: &str) -> Vec<String> {
    let mut refs = vec![tenant_ref.to_string()];
    if let Ok(id) = Uuid::parse_str(tenant_ref) {
        push_unique(&mut refs, id.hyphenated().to_string());
        push_unique(&mut refs, id.simple().to_string());
    }
    refs
}

fn push_unique(refs: &mut Vec<String>, value: String) {
    if !refs.contains(&value) {
        refs.push(value);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntactic_forms_hyphenated_uuid() {
        let refs = syntactic_forms("11111111-2222-3333-4444-555555555555");
        assert_eq!(
            refs,
            vec![
                "11111111-2222-3333-4444-555555555555".to_string(),
                "11111111222233334444555555555555".to_string(),
            ]
        );
    }

    #[test]
    fn test_syntactic_forms_simple_uuid() {
        let refs = syntactic_forms("11111111222233334444555555555555");
        assert!(refs.contains(&"11111111-2222-3333-4444-555555555555".to_string()));
        assert!(refs.contains(&"11111111222233334444555555555555".to_string()));
        // Input form stays first for stable logging.
        assert_eq!(refs[0], "11111111222233334444555555555555");
    }

    #[test]
    fn test_syntactic_forms_slug() {
        let refs = syntactic_forms("acme-corp");
        assert_eq!(refs, vec!["acme-corp".to_string()]);
    }

    #[test]
    fn test_push_unique_no_duplicates() {
        let mut refs = vec!["a".to_string()];
        push_unique(&mut refs, "a".to_string());
        push_unique(&mut refs, "b".to_string());
        assert_eq!(refs, vec!["a".to_string(), "b".to_string()]);
    }
}
