use crate::audit;
use crate::errors::AppError;
use crate::models::alert::AlertType;
use crate::models::template::{
    NewTemplate, ProtocolStep, ProtocolTemplate, StepInput, TemplateDraft, TemplateUpdate,
};
use crate::repository::ProtocolRepository;
use super::{ProtocolService, catalog, non_blank};

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "must not be empty"));
    }
    Ok(name.to_string())
}

fn validate_sla(sla_minutes: u32) -> Result<u32, AppError> {
    if sla_minutes == 0 {
        return Err(AppError::validation("sla_minutes", "must be a positive number of minutes"));
    }
    Ok(sla_minutes)
}

/// Validate step input and number it 1..N by position. Caller-supplied orders are discarded.
pub fn build_steps(inputs: Vec<StepInput>) -> Result<Vec<ProtocolStep>, AppError> {
    if inputs.is_empty() {
        return Err(AppError::validation("steps", "at least one step is required"));
    }

    inputs
        .into_iter()
        .zip(1u32..)
        .enumerate()
        .map(|(idx, (input, order))| {
            let title = input.title.trim();
            if title.is_empty() {
                return Err(AppError::validation(format!("steps[{idx}].title"), "must not be empty"));
            }
            Ok(ProtocolStep {
                order,
                title: title.to_string(),
                title_localized: non_blank(input.title_localized),
                description: non_blank(input.description),
                description_localized: non_blank(input.description_localized),
                is_required: input.is_required,
                photo_required: input.photo_required,
            })
        })
        .collect()
}

impl<R: ProtocolRepository> ProtocolService<R> {
    /// Live templates of an organization, grouped by alert type, newest first within a type.
    pub async fn list_templates(
        &self,
        organization_id: i64,
        alert_type: Option<&AlertType>,
    ) -> Result<Vec<ProtocolTemplate>, AppError> {
        self.repo.list_templates(organization_id, alert_type).await
    }

    /// The template new executions of this alert type will follow, if any.
    pub async fn get_active_template(
        &self,
        organization_id: i64,
        alert_type: &AlertType,
    ) -> Result<Option<ProtocolTemplate>, AppError> {
        self.repo.find_active_template(organization_id, alert_type).await
    }

    pub async fn get_template(&self, id: i64) -> Result<ProtocolTemplate, AppError> {
        match self.repo.find_template(id).await? {
            Some(template) if !template.is_deleted() => Ok(template),
            _ => Err(AppError::not_found("template", id)),
        }
    }

    pub async fn create_template(
        &self,
        organization_id: i64,
        input: NewTemplate,
        actor_id: i64,
    ) -> Result<ProtocolTemplate, AppError> {
        let draft = TemplateDraft {
            organization_id,
            name: validate_name(&input.name)?,
            steps: build_steps(input.steps)?,
            sla_minutes: validate_sla(input.sla_minutes)?,
            alert_type: input.alert_type,
            name_localized: non_blank(input.name_localized),
            is_active: input.is_active,
            created_at: self.now(),
        };

        let template = self
            .repo
            .insert_templates(std::slice::from_ref(&draft))
            .await?
            .pop()
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;

        log::info!(
            "Created protocol template {} '{}' for {} in org {} ({} steps)",
            template.id,
            template.name,
            template.alert_type,
            organization_id,
            template.steps.len()
        );
        audit::log(
            actor_id,
            "protocol_template.created",
            "protocol_template",
            template.id,
            serde_json::json!({
                "organization_id": organization_id,
                "alert_type": template.alert_type,
                "is_active": template.is_active,
            }),
        );
        Ok(template)
    }

    /// Apply a partial update. A given step list replaces the old one wholesale.
    /// Activating does not deactivate siblings; a second active template is a conflict.
    pub async fn update_template(
        &self,
        id: i64,
        update: TemplateUpdate,
        actor_id: i64,
    ) -> Result<ProtocolTemplate, AppError> {
        // Validate everything before loading or writing.
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let steps = update.steps.map(build_steps).transpose()?;
        let sla_minutes = update.sla_minutes.map(validate_sla).transpose()?;

        let mut template = self.get_template(id).await?;
        if let Some(name) = name {
            template.name = name;
        }
        if let Some(steps) = steps {
            template.steps = steps;
        }
        if let Some(sla_minutes) = sla_minutes {
            template.sla_minutes = sla_minutes;
        }
        if let Some(alert_type) = update.alert_type {
            template.alert_type = alert_type;
        }
        if update.name_localized.is_some() {
            template.name_localized = non_blank(update.name_localized);
        }
        if let Some(is_active) = update.is_active {
            template.is_active = is_active;
        }
        template.updated_at = self.now();

        self.repo.update_template(&template).await?;

        log::info!("Updated protocol template {} ({} steps)", template.id, template.steps.len());
        audit::log(
            actor_id,
            "protocol_template.updated",
            "protocol_template",
            template.id,
            serde_json::json!({ "is_active": template.is_active, "steps": template.steps.len() }),
        );
        Ok(template)
    }

    /// Soft delete. Executions that reference the template keep resolving its steps.
    pub async fn delete_template(&self, id: i64, actor_id: i64) -> Result<(), AppError> {
        self.repo.soft_delete_template(id, self.now()).await?;
        log::info!("Deleted protocol template {id}");
        audit::log(actor_id, "protocol_template.deleted", "protocol_template", id, serde_json::json!({}));
        Ok(())
    }

    /// Create one active template per known alert type from the default catalog,
    /// each with the configured default SLA.
    ///
    /// Not idempotent: callers guard against repeat invocation. Because only one
    /// template per type may be active, a repeat call fails with a conflict and
    /// writes nothing.
    pub async fn seed_defaults(&self, organization_id: i64, actor_id: i64) -> Result<Vec<ProtocolTemplate>, AppError> {
        let now = self.now();
        let drafts: Vec<TemplateDraft> = AlertType::KNOWN
            .iter()
            .map(|alert_type| {
                let entry = catalog::entry(alert_type);
                TemplateDraft {
                    organization_id,
                    alert_type: alert_type.clone(),
                    name: entry.name.to_string(),
                    name_localized: None,
                    steps: catalog::default_steps(alert_type),
                    sla_minutes: self.config.default_sla_minutes,
                    is_active: true,
                    created_at: now,
                }
            })
            .collect();

        let created = self.repo.insert_templates(&drafts).await?;
        log::info!(
            "Seeded {} default protocol templates for org {} (catalog v{})",
            created.len(),
            organization_id,
            catalog::CATALOG_VERSION
        );
        audit::log(
            actor_id,
            "protocol_template.seeded",
            "organization",
            organization_id,
            serde_json::json!({
                "catalog_version": catalog::CATALOG_VERSION,
                "template_ids": created.iter().map(|t| t.id).collect::<Vec<_>>(),
            }),
        );
        Ok(created)
    }

    /// Steps the default catalog provides for an alert type.
    pub fn default_steps(&self, alert_type: &AlertType) -> Vec<ProtocolStep> {
        catalog::default_steps(alert_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, order: Option<u32>) -> StepInput {
        StepInput {
            order,
            title: title.to_string(),
            ..StepInput::default()
        }
    }

    #[test]
    fn build_steps_ignores_caller_orders() {
        let steps = build_steps(vec![
            input("Third", Some(30)),
            input("First", Some(1)),
            input("Again", Some(1)),
        ])
        .unwrap();
        let orders: Vec<u32> = steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(steps[0].title, "Third");
    }

    #[test]
    fn build_steps_names_the_empty_title() {
        let err = build_steps(vec![input("Ok", None), input("   ", None)]).unwrap_err();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field, "steps[1].title"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn build_steps_rejects_empty_list() {
        assert!(matches!(build_steps(Vec::new()), Err(AppError::Validation { .. })));
    }
}
