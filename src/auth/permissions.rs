use crate::auth::{Principal, Role};
use crate::content::{ContentItem, ContentModule};

/// Named permissions checked against a principal's roles and, for edits,
/// resource ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Create,
    Edit,
    ViewDrafts,
}

/// Pure capability check: no I/O, fully deterministic.
///
/// `create` and `view_drafts` are role-gated per module. `edit` is
/// role-gated or granted to the resource's author when a resource is
/// supplied. No principal always yields `false`.
pub fn can_perform(
    principal: Option<&Principal>,
    capability: Capability,
    module: ContentModule,
    resource: Option<&ContentItem>,
) -> bool {
    let principal = match principal {
        Some(p) => p,
        None => return false,
    };

    if principal.has_role(Role::Admin) {
        return true;
    }

    if capability == Capability::Edit {
        if let Some(item) = resource {
            if item.author_id == principal.user_id {
                return true;
            }
        }
    }

    match module {
        ContentModule::Article | ContentModule::Guide | ContentModule::Catalog => {
            principal.has_role(Role::Editor)
        }
        ContentModule::Thread => match capability {
            Capability::Create => {
                principal.has_role(Role::Member) || principal.has_role(Role::Moderator)
            }
            Capability::Edit | Capability::ViewDrafts => principal.has_role(Role::Moderator),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ItemStats, ItemStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn principal(roles: Vec<Role>) -> Principal {
        Principal { user_id: Uuid::new_v4(), display_name: "Test".to_string(), roles }
    }

    fn item_by(author_id: Uuid, module: ContentModule) -> ContentItem {
        let now = Utc::now();
        ContentItem {
            id: Uuid::new_v4(),
            module,
            slug: "example".to_string(),
            title: "Example".to_string(),
            body: String::new(),
            author_id,
            author_display_name: "Author".to_string(),
            category: "general".to_string(),
            status: ItemStatus::Published,
            created_at: now,
            updated_at: now,
            published_at: Some(now),
            stats: ItemStats::default(),
        }
    }

    const MODULES: [ContentModule; 4] = [
        ContentModule::Article,
        ContentModule::Thread,
        ContentModule::Guide,
        ContentModule::Catalog,
    ];
    const CAPABILITIES: [Capability; 3] =
        [Capability::Create, Capability::Edit, Capability::ViewDrafts];

    #[test]
    fn no_principal_is_always_denied() {
        for module in MODULES {
            for capability in CAPABILITIES {
                assert!(!can_perform(None, capability, module, None));
            }
        }
    }

    #[test]
    fn admin_is_always_granted() {
        let admin = principal(vec![Role::Admin]);
        for module in MODULES {
            for capability in CAPABILITIES {
                assert!(can_perform(Some(&admin), capability, module, None));
            }
        }
    }

    #[test]
    fn editor_covers_non_thread_modules_only() {
        let editor = principal(vec![Role::Editor]);
        for module in [ContentModule::Article, ContentModule::Guide, ContentModule::Catalog] {
            for capability in CAPABILITIES {
                assert!(can_perform(Some(&editor), capability, module, None));
            }
        }
        for capability in CAPABILITIES {
            assert!(!can_perform(Some(&editor), capability, ContentModule::Thread, None));
        }
    }

    #[test]
    fn member_creates_threads_but_nothing_else() {
        let member = principal(vec![Role::Member]);
        assert!(can_perform(Some(&member), Capability::Create, ContentModule::Thread, None));
        assert!(!can_perform(Some(&member), Capability::Edit, ContentModule::Thread, None));
        assert!(!can_perform(Some(&member), Capability::ViewDrafts, ContentModule::Thread, None));
        assert!(!can_perform(Some(&member), Capability::Create, ContentModule::Article, None));
    }

    #[test]
    fn moderator_manages_threads() {
        let moderator = principal(vec![Role::Moderator]);
        assert!(can_perform(Some(&moderator), Capability::Create, ContentModule::Thread, None));
        assert!(can_perform(Some(&moderator), Capability::Edit, ContentModule::Thread, None));
        assert!(can_perform(Some(&moderator), Capability::ViewDrafts, ContentModule::Thread, None));
        assert!(!can_perform(Some(&moderator), Capability::Edit, ContentModule::Guide, None));
    }

    #[test]
    fn author_may_edit_own_item_without_role() {
        let member = principal(vec![Role::Member]);
        let own = item_by(member.user_id, ContentModule::Article);
        let other = item_by(Uuid::new_v4(), ContentModule::Article);

        assert!(can_perform(Some(&member), Capability::Edit, ContentModule::Article, Some(&own)));
        assert!(!can_perform(Some(&member), Capability::Edit, ContentModule::Article, Some(&other)));
        // Ownership grants edit only, not draft preview of others
        assert!(!can_perform(
            Some(&member),
            Capability::ViewDrafts,
            ContentModule::Article,
            Some(&own)
        ));
    }
}
