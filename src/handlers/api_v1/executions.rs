use actix_web::{web, HttpResponse};

use crate::auth::actor::Actor;
use crate::errors::AppError;
use crate::protocol::ProtocolService;
use crate::repository::ProtocolRepository;
use super::types::{
    CloseRequest, CompleteStepRequest, EscalateRequest, ExecutionDetail, StartExecutionRequest,
};

/// POST /api/v1/alerts/{alert_id}/executions - Start the protocol for an alert
/// Body: {"template_id": optional}. An empty JSON object uses the active template.
pub async fn start<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<i64>,
    body: Option<web::Json<StartExecutionRequest>>,
) -> Result<HttpResponse, AppError> {
    let template_id = body.and_then(|b| b.into_inner().template_id);
    let execution = service
        .start_execution(path.into_inner(), actor.id(), template_id)
        .await?;
    Ok(HttpResponse::Created().json(execution))
}

/// GET /api/v1/alerts/{alert_id}/executions
pub async fn list_for_alert<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let executions = service.list_executions_for_alert(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(executions))
}

/// GET /api/v1/executions/{id} - Execution with its steps, closure gate and SLA
pub async fn read<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let execution = service.get_execution(id).await?;
    let steps = service.effective_steps(&execution).await?;
    let closure_eligibility = service.closure_eligibility(id).await?;
    let sla = service.sla_status(id).await?;

    Ok(HttpResponse::Ok().json(ExecutionDetail {
        execution,
        steps,
        closure_eligibility,
        sla,
    }))
}

/// POST /api/v1/executions/{id}/steps/{order}
pub async fn complete_step<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<(i64, u32)>,
    body: Option<web::Json<CompleteStepRequest>>,
) -> Result<HttpResponse, AppError> {
    let (id, order) = path.into_inner();
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let execution = service
        .complete_step(id, order, actor.id(), body.notes, body.evidence_ref)
        .await?;
    Ok(HttpResponse::Ok().json(execution))
}

/// POST /api/v1/executions/{id}/escalate
pub async fn escalate<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<i64>,
    body: web::Json<EscalateRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let execution = service
        .escalate(path.into_inner(), actor.id(), &body.reason, body.escalate_to)
        .await?;
    Ok(HttpResponse::Ok().json(execution))
}

/// GET /api/v1/executions/{id}/closure - Whether the execution may close now
pub async fn closure<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let eligibility = service.closure_eligibility(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(eligibility))
}

/// POST /api/v1/executions/{id}/close
pub async fn close<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    actor: Actor,
    path: web::Path<i64>,
    body: Option<web::Json<CloseRequest>>,
) -> Result<HttpResponse, AppError> {
    let notes = body.and_then(|b| b.into_inner().notes);
    let execution = service
        .close_execution(path.into_inner(), actor.id(), notes)
        .await?;
    Ok(HttpResponse::Ok().json(execution))
}

/// GET /api/v1/executions/{id}/sla
pub async fn sla<R: ProtocolRepository + 'static>(
    service: web::Data<ProtocolService<R>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let status = service.sla_status(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(status))
}
