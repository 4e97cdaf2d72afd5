//! The built-in rule catalog used in production.

use indexmap::IndexMap;

use crate::id::LinkType;

use super::fields::{field_list, FieldPath, FieldRule};
use super::paths::ExpansionPath;
use super::LinkTypeRules;

const REVERSE_LINKS: &[(&str, &str)] = &[
    ("parent", "children"),
    ("documents", "document_collections"),
    ("working_groups", "policies"),
    ("parent_taxons", "child_taxons"),
    ("root_taxon", "level_one_taxons"),
    ("pages_part_of_step_nav", "part_of_step_navs"),
    ("pages_related_to_step_nav", "related_to_step_navs"),
    ("legacy_taxons", "topic_taxonomy_taxons"),
    ("pages_secondary_to_step_nav", "secondary_to_step_navs"),
    ("person", "role_appointments"),
    ("role", "role_appointments"),
];

const MULTI_LEVEL_LINK_PATHS: &[&str] = &[
    "associated_taxons*",
    "child_taxons > associated_taxons*",
    "child_taxons* > legacy_taxons",
    "child_taxons*",
    "parent*",
    "parent_taxons*",
    "parent_taxons* > root_taxon",
    "taxons > root_taxon",
    "taxons > parent_taxons*",
    "taxons > parent_taxons* > root_taxon",
    "ordered_related_items > mainstream_browse_pages > parent*",
    "ordered_related_items_overrides > taxons",
    "facets > facet_values > facet_group",
    "facet_group > facets > facet_values",
    "role_appointments > person",
    "role_appointments > role > ordered_parent_organisations",
];

const DEFAULT_FIELDS: &[&str] = &[
    "analytics_identifier",
    "api_path",
    "base_path",
    "content_id",
    "document_type",
    "locale",
    "public_updated_at",
    "schema_name",
    "title",
    "withdrawn",
];

const DRAFT_ONLY_FIELDS: &[&str] = &["auth_bypass_ids"];

const ROLE_DOCUMENT_TYPES: &[&str] = &[
    "ambassador_role",
    "board_member_role",
    "chief_professional_officer_role",
    "chief_scientific_advisor_role",
    "chief_scientific_officer_role",
    "deputy_head_of_mission_role",
    "governor_role",
    "high_commissioner_role",
    "military_role",
    "ministerial_role",
    "special_representative_role",
    "traffic_commissioner_role",
    "worldwide_office_staff_role",
];

fn defaults_plus(extra: &[&str]) -> Vec<FieldPath> {
    let mut fields = field_list(DEFAULT_FIELDS);
    fields.extend(field_list(extra));
    fields
}

fn rule(document_type: &str, link_type: Option<&str>, fields: Vec<FieldPath>) -> FieldRule {
    FieldRule {
        document_type: document_type.to_string(),
        link_type: link_type.map(LinkType::from),
        fields,
    }
}

fn field_rules() -> Vec<FieldRule> {
    let default_and_description = defaults_plus(&["description"]);
    let contact = defaults_plus(&[
        "details.description",
        "details.title",
        "details.contact_form_links",
        "details.post_addresses",
        "details.email_addresses",
        "details.phone_numbers",
    ]);
    let government = field_list(&[
        "content_id",
        "title",
        "api_path",
        "base_path",
        "document_type",
        "details.start_date",
        "details.end_date",
        "details.current",
    ]);
    let organisation: Vec<FieldPath> = defaults_plus(&[
        "details.logo",
        "details.brand",
        "details.default_news_image",
    ])
    .into_iter()
    .filter(|field| field.to_string() != "public_updated_at")
    .collect();
    let taxon = defaults_plus(&["description", "details", "phase"]);
    let need = defaults_plus(&[
        "details.role",
        "details.goal",
        "details.benefit",
        "details.met_when",
        "details.justifications",
    ]);
    let finder = defaults_plus(&["details.facets"]);
    let with_body = defaults_plus(&["details.body"]);
    let role_appointment = defaults_plus(&[
        "details.started_on",
        "details.ended_on",
        "details.current",
        "details.person_appointment_order",
    ]);
    let step_by_step = defaults_plus(&[
        "details.step_by_step_nav.title",
        "details.step_by_step_nav.steps",
    ]);
    let mut step_by_step_auth_bypass = step_by_step.clone();
    step_by_step_auth_bypass.extend(field_list(&["auth_bypass_ids"]));
    let travel_advice = defaults_plus(&["details.country", "details.change_description"]);
    let world_location = field_list(&[
        "content_id",
        "title",
        "schema_name",
        "locale",
        "analytics_identifier",
    ]);
    let facet_group = field_list(&[
        "content_id",
        "title",
        "locale",
        "schema_name",
        "details.name",
        "details.description",
    ]);
    let facet = field_list(&[
        "content_id",
        "title",
        "locale",
        "schema_name",
        "details.combine_mode",
        "details.display_as_result_metadata",
        "details.filterable",
        "details.filter_key",
        "details.key",
        "details.name",
        "details.preposition",
        "details.short_name",
        "details.type",
    ]);
    let facet_value = field_list(&[
        "content_id",
        "title",
        "locale",
        "schema_name",
        "details.label",
        "details.value",
    ]);

    let mut rules = vec![
        rule("redirect", None, Vec::new()),
        rule("gone", None, Vec::new()),
        rule("contact", None, contact),
        rule("topical_event", None, field_list(DEFAULT_FIELDS)),
        rule("placeholder_topical_event", None, field_list(DEFAULT_FIELDS)),
        rule("organisation", None, organisation.clone()),
        rule("placeholder_organisation", None, organisation),
        rule("taxon", None, taxon),
        rule("need", None, need),
        rule("finder", Some("finder"), finder),
        rule("mainstream_browse_page", None, default_and_description.clone()),
        rule("person", Some("person"), with_body.clone()),
        rule("role_appointment", None, role_appointment),
        rule("service_manual_topic", None, default_and_description),
        rule(
            "step_by_step_nav",
            Some("part_of_step_navs"),
            step_by_step_auth_bypass.clone(),
        ),
        rule(
            "step_by_step_nav",
            Some("related_to_step_navs"),
            step_by_step_auth_bypass,
        ),
        rule("step_by_step_nav", None, step_by_step),
        rule("travel_advice", None, travel_advice),
        rule("world_location", None, world_location),
        rule("facet_group", None, facet_group),
        rule("facet", None, facet),
        rule("facet_value", None, facet_value),
        rule("government", None, government),
    ];
    rules.extend(
        ROLE_DOCUMENT_TYPES
            .iter()
            .map(|document_type| rule(document_type, None, with_body.clone())),
    );
    rules
}

pub(super) fn standard_rules() -> LinkTypeRules {
    let reverse_links: IndexMap<LinkType, LinkType> = REVERSE_LINKS
        .iter()
        .map(|(direct, reverse)| (LinkType::from(*direct), LinkType::from(*reverse)))
        .collect();
    let paths = MULTI_LEVEL_LINK_PATHS
        .iter()
        .filter_map(|p| p.parse::<ExpansionPath>().ok())
        .collect();

    LinkTypeRules {
        reverse_links,
        paths,
        root_reverse_links: None,
        default_fields: field_list(DEFAULT_FIELDS),
        draft_only_fields: field_list(DRAFT_ONLY_FIELDS),
        field_rules: field_rules(),
    }
}
