//! Built-in default checklists, used whenever an alert type has no active template
//! and as the source for `seed_defaults`.
//!
//! The contents are part of the engine's compatibility surface: executions that
//! started on the default catalog resolve their steps from here for their whole
//! life. Change the text only together with `CATALOG_VERSION`.

use crate::models::alert::AlertType;
use crate::models::template::ProtocolStep;

pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug)]
pub struct CatalogStep {
    pub title: &'static str,
    pub description: &'static str,
    pub is_required: bool,
    pub photo_required: bool,
}

#[derive(Debug)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub steps: &'static [CatalogStep],
}

const fn required(title: &'static str, description: &'static str) -> CatalogStep {
    CatalogStep { title, description, is_required: true, photo_required: false }
}

const fn optional(title: &'static str, description: &'static str) -> CatalogStep {
    CatalogStep { title, description, is_required: false, photo_required: false }
}

const fn with_photo(step: CatalogStep) -> CatalogStep {
    CatalogStep { photo_required: true, ..step }
}

const PANIC: CatalogEntry = CatalogEntry {
    name: "Panic Response",
    steps: &[
        required("Locate the person", "Find the person who raised the alert using the reported location."),
        required("Assess danger", "Check for immediate threats to the person and responders."),
        required("Make contact", "Speak with the person and confirm what happened."),
        optional("Request backup", "Call additional responders if the situation is not under control."),
        required("Secure the area", "Keep bystanders away and remove the source of danger if safe."),
        with_photo(required("Document the incident", "Record what happened and attach a photo of the scene.")),
    ],
};

const MEDICAL: CatalogEntry = CatalogEntry {
    name: "Medical Emergency",
    steps: &[
        required("Confirm casualty location", "Reach the casualty at the reported location."),
        required("Check scene safety", "Make sure the area is safe before approaching."),
        required("Call emergency medical services", "Phone the ambulance service and give the exact address."),
        required("Give first aid", "Provide first aid within your training until help arrives."),
        optional("Fetch AED and first-aid kit", "Bring the nearest defibrillator and first-aid kit."),
        optional("Guide paramedics", "Meet the ambulance at the entrance and lead the crew to the casualty."),
        with_photo(required("Record handover", "Note the casualty's condition at handover and attach a photo of the report.")),
    ],
};

const FIRE: CatalogEntry = CatalogEntry {
    name: "Fire Response",
    steps: &[
        required("Raise the fire alarm", "Activate the nearest manual call point if the alarm is not sounding."),
        required("Call the fire department", "Report the fire, its location and whether anyone is trapped."),
        required("Evacuate the affected zone", "Direct everyone in the zone to the nearest safe exit."),
        optional("Shut off gas and electricity", "Isolate gas and electrical supply to the zone if it is safe to do so."),
        optional("Fight small fires if trained", "Use an extinguisher only on small fires and only with a clear exit behind you."),
        required("Close doors", "Close doors behind you to slow the spread of fire and smoke."),
        required("Assist people with reduced mobility", "Escort or shelter people who cannot use the stairs."),
        required("Take a headcount", "Account for everyone at the assembly point."),
        required("Brief the fire crew", "Tell arriving firefighters about missing people and hazards."),
        with_photo(optional("Photograph the damage", "Once the area is declared safe, photograph the affected zone.")),
    ],
};

const SECURITY_BREACH: CatalogEntry = CatalogEntry {
    name: "Security Breach Response",
    steps: &[
        required("Verify the breach", "Confirm the location and nature of the breach."),
        required("Notify the security supervisor", "Inform the supervisor on duty."),
        required("Lock down access points", "Secure doors and gates around the affected area."),
        optional("Review CCTV footage", "Check recent footage to identify the intruder and their route."),
        optional("Contact the police", "Call the police if there is a threat to people or property."),
        with_photo(required("Preserve evidence", "Keep the scene untouched and photograph any damage.")),
        required("Restore normal access", "Reopen access points once the area is cleared."),
    ],
};

const GENERAL: CatalogEntry = CatalogEntry {
    name: "General Emergency",
    steps: &[
        required("Acknowledge the alert", "Confirm you are responding to the alert."),
        required("Assess the situation", "Go to the location and establish what is happening."),
        required("Take corrective action", "Act to remove the hazard or contain the situation."),
        optional("Notify stakeholders", "Inform the site manager and anyone affected."),
        with_photo(required("Document the outcome", "Describe the outcome and attach a photo.")),
    ],
};

/// Catalog entry for an alert type. Custom types use the general checklist.
pub fn entry(alert_type: &AlertType) -> &'static CatalogEntry {
    match alert_type {
        AlertType::Panic => &PANIC,
        AlertType::Medical => &MEDICAL,
        AlertType::Fire => &FIRE,
        AlertType::SecurityBreach => &SECURITY_BREACH,
        AlertType::General | AlertType::Custom(_) => &GENERAL,
    }
}

/// Default steps for an alert type, numbered 1..N.
pub fn default_steps(alert_type: &AlertType) -> Vec<ProtocolStep> {
    entry(alert_type)
        .steps
        .iter()
        .zip(1u32..)
        .map(|(step, order)| ProtocolStep {
            order,
            title: step.title.to_string(),
            title_localized: None,
            description: Some(step.description.to_string()),
            description_localized: None,
            is_required: step.is_required,
            photo_required: step.photo_required,
        })
        .collect()
}
