use actix_web::{web, HttpResponse};

use crate::auth::actor::Actor;
use crate::errors::AppError;
use crate::models::alert::AlertType;
use crate::models::template::{NewTemplate, TemplateUpdate};
use crate::protocol::ProtocolService;
use crate::protocol::catalog;
use crate::repository::ProtocolRepository;
use super::types::{PaginatedResponse, TemplateListQuery};

/// GET /api/v1/catalog/{alert_type} - Default steps for an alert type
pub async fn catalog_steps<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let alert_type: AlertType = path.into_inner().parse()?;
    let entry = catalog::entry(&alert_type);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "alert_type": alert_type,
        "catalog_version": catalog::CATALOG_VERSION,
        "name": entry.name,
        "sla_minutes": service.config().default_sla_minutes,
        "steps": service.default_steps(&alert_type),
    })))
}

/// GET /api/v1/orgs/{org_id}/templates - List live templates
/// Query params: alert_type (filter), page (default 1), per_page (default 25)
pub async fn list<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<i64>,
    query: web::Query<TemplateListQuery>,
) -> Result<HttpResponse, AppError> {
    let org_id = path.into_inner();
    let query = query.into_inner();
    let alert_type = query.alert_type.as_deref().map(str::parse::<AlertType>).transpose()?;

    let all = service.list_templates(org_id, alert_type.as_ref()).await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse::paginate(all, query.page, query.per_page)))
}

/// POST /api/v1/orgs/{org_id}/templates - Create a template
pub async fn create<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<i64>,
    body: web::Json<NewTemplate>,
) -> Result<HttpResponse, AppError> {
    let template = service
        .create_template(path.into_inner(), body.into_inner(), actor.id())
        .await?;
    Ok(HttpResponse::Created().json(template))
}

/// GET /api/v1/orgs/{org_id}/templates/active/{alert_type}
pub async fn active<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<(i64, String)>,
) -> Result<HttpResponse, AppError> {
    let (org_id, alert_type) = path.into_inner();
    let alert_type: AlertType = alert_type.parse()?;

    match service.get_active_template(org_id, &alert_type).await? {
        Some(template) => Ok(HttpResponse::Ok().json(template)),
        None => Err(AppError::NoActiveTemplate {
            organization_id: org_id,
            alert_type: alert_type.to_string(),
        }),
    }
}

/// POST /api/v1/orgs/{org_id}/templates/seed - Install the default catalog
pub async fn seed<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let created = service.seed_defaults(path.into_inner(), actor.id()).await?;
    Ok(HttpResponse::Created().json(created))
}

/// GET /api/v1/templates/{id}
pub async fn read<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let template = service.get_template(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(template))
}

/// PUT /api/v1/templates/{id}
pub async fn update<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<i64>,
    body: web::Json<TemplateUpdate>,
) -> Result<HttpResponse, AppError> {
    let template = service
        .update_template(path.into_inner(), body.into_inner(), actor.id())
        .await?;
    Ok(HttpResponse::Ok().json(template))
}

/// DELETE /api/v1/templates/{id}
pub async fn delete<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    service.delete_template(path.into_inner(), actor.id()).await?;
    Ok(HttpResponse::NoContent().finish())
}
