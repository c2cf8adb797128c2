//! Built-in revision script templates
//!
//! `mkdir` copies one of these into the script directory as
//! `script.sql.tera`; it is never overwritten afterwards, so users can
//! customize the generated file layout. The `generic` variant is used for a
//! single configured database, `multidb` when more than one logical database
//! is configured.

/// File name of the template inside the script directory
pub const TEMPLATE_FILENAME: &str = "script.sql.tera";

/// Template for single-database configurations
pub const GENERIC: &str = r#"-- revision: {{ rev_id }}
{% if parents %}-- parents: {{ parents | join(sep=", ") }}
{% endif %}{% if branch_labels %}-- branch-labels: {{ branch_labels | join(sep=", ") }}
{% endif %}{% if depends_on %}-- depends-on: {{ depends_on | join(sep=", ") }}
{% endif %}-- message: {{ message }}
-- created: {{ create_date }}

-- upgrades

{{ up_sql }}

-- downgrades

{{ down_sql }}
"#;

/// Template for multi-database configurations: one upgrade/downgrade section
/// pair per logical database, named by its tokens so the sections cannot
/// collide.
pub const MULTIDB: &str = r#"-- revision: {{ rev_id }}
{% if parents %}-- parents: {{ parents | join(sep=", ") }}
{% endif %}{% if branch_labels %}-- branch-labels: {{ branch_labels | join(sep=", ") }}
{% endif %}{% if depends_on %}-- depends-on: {{ depends_on | join(sep=", ") }}
{% endif %}-- message: {{ message }}
-- created: {{ create_date }}
{% for db in databases %}
-- {{ db.upgrade_token }}

{{ db.up_sql }}

-- {{ db.downgrade_token }}

{{ db.down_sql }}
{% endfor %}"#;

/// Look up a built-in template by variant name
pub fn builtin_template(name: &str) -> Option<&'static str> {
    match name {
        "generic" => Some(GENERIC),
        "multidb" => Some(MULTIDB),
        _ => None,
    }
}
