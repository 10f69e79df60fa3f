//! Pads REST API: pad list management and the editing session.
//!
//! Session routes live under `/api/session` so that no pad name can shadow
//! them under `/api/pads/{name}`.

use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use mdpad_types::{
    CreatePadRequest, ImportPadRequest, RenamePadRequest, RpcResponse, SelectPadRequest,
    UpdateBufferRequest,
};

use crate::pads::PadError;
use crate::AppState;

/// Status code for a failed pad operation
fn pad_error_response(e: PadError) -> HttpResponse {
    let mut builder = match &e {
        PadError::EmptyName => HttpResponse::BadRequest(),
        PadError::NameTaken(_) => HttpResponse::Conflict(),
        PadError::NotFound(_) => HttpResponse::NotFound(),
        PadError::Store(err) => {
            log::error!("[PADS] Store error: {}", err);
            HttpResponse::InternalServerError()
        }
    };
    builder.json(RpcResponse::<()>::err(e.to_string()))
}

// --- Pad list ---

/// GET /api/pads
async fn list_pads(data: web::Data<AppState>) -> impl Responder {
    let listing = data.session.lock().listing();
    HttpResponse::Ok().json(RpcResponse::ok(listing))
}

/// POST /api/pads: create a pad and select it
async fn create_pad(
    data: web::Data<AppState>,
    body: web::Json<CreatePadRequest>,
) -> impl Responder {
    let body = body.into_inner();
    let mut session = data.session.lock();

    let created = session
        .create(&body.name, body.content.as_deref().unwrap_or_default())
        .map(|_| ());
    match created {
        Ok(()) => HttpResponse::Created().json(RpcResponse::ok(session.view())),
        Err(e) => {
            if e.is_rejection() {
                log::warn!("[PADS] Create rejected: {}", e);
            }
            pad_error_response(e)
        }
    }
}

/// POST /api/import: create a pad from an uploaded markdown file
async fn import_pad(
    data: web::Data<AppState>,
    body: web::Json<ImportPadRequest>,
) -> impl Responder {
    let body = body.into_inner();
    let mut session = data.session.lock();

    let imported = session
        .import(&body.filename, &body.content, body.name.as_deref())
        .map(|_| ());
    match imported {
        Ok(()) => HttpResponse::Created().json(RpcResponse::ok(session.view())),
        Err(e) => pad_error_response(e),
    }
}

/// PUT /api/pads/{name}: rename
async fn rename_pad(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RenamePadRequest>,
) -> impl Responder {
    let name = path.into_inner();
    let mut session = data.session.lock();

    match session.rename(&name, &body.new_name) {
        Ok(_) => HttpResponse::Ok().json(RpcResponse::ok(session.view())),
        Err(e) => {
            if e.is_rejection() {
                log::warn!("[PADS] Rename of \"{}\" rejected: {}", name, e);
            }
            pad_error_response(e)
        }
    }
}

/// DELETE /api/pads/{name}
async fn delete_pad(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let name = path.into_inner();
    let mut session = data.session.lock();

    match session.delete(&name) {
        Ok(()) => HttpResponse::Ok().json(RpcResponse::ok(session.view())),
        Err(e) => pad_error_response(e),
    }
}

/// GET /api/pads/{name}/download: markdown attachment
async fn download_pad(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let name = path.into_inner();
    let export = data.session.lock().export(&name);

    match export {
        Ok(file) => HttpResponse::Ok()
            .content_type(file.mime)
            .insert_header((header::CONTENT_DISPOSITION, file.disposition()))
            .body(file.body),
        Err(e) => pad_error_response(e),
    }
}

// --- Session ---

/// GET /api/session
async fn get_session(data: web::Data<AppState>) -> impl Responder {
    let view = data.session.lock().view();
    HttpResponse::Ok().json(RpcResponse::ok(view))
}

/// POST /api/session/select: switch the editor to another pad
async fn select_pad(
    data: web::Data<AppState>,
    body: web::Json<SelectPadRequest>,
) -> impl Responder {
    let mut session = data.session.lock();

    match session.select(&body.name) {
        Ok(active) => HttpResponse::Ok().json(RpcResponse::ok(active.view())),
        Err(e) => pad_error_response(e),
    }
}

/// GET /api/session/buffer
async fn get_buffer(data: web::Data<AppState>) -> impl Responder {
    let view = data.session.lock().active().view();
    HttpResponse::Ok().json(RpcResponse::ok(view))
}

/// PUT /api/session/buffer: replace the editor content
async fn update_buffer(
    data: web::Data<AppState>,
    body: web::Json<UpdateBufferRequest>,
) -> impl Responder {
    let mut session = data.session.lock();
    session.edit(body.into_inner().content);
    HttpResponse::Ok().json(RpcResponse::ok(session.active().view()))
}

/// POST /api/session/save: flush the active pad and the list now
async fn save_session(data: web::Data<AppState>) -> impl Responder {
    let mut session = data.session.lock();

    match session.flush() {
        Ok(()) => HttpResponse::Ok().json(RpcResponse::ok(session.view())),
        Err(e) => pad_error_response(e),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/pads")
            .route(web::get().to(list_pads))
            .route(web::post().to(create_pad)),
    )
    .service(web::resource("/api/import").route(web::post().to(import_pad)))
    .service(
        web::resource("/api/pads/{name}")
            .route(web::put().to(rename_pad))
            .route(web::delete().to(delete_pad)),
    )
    .service(web::resource("/api/pads/{name}/download").route(web::get().to(download_pad)))
    .service(web::resource("/api/session").route(web::get().to(get_session)))
    .service(web::resource("/api/session/select").route(web::post().to(select_pad)))
    .service(
        web::resource("/api/session/buffer")
            .route(web::get().to(get_buffer))
            .route(web::put().to(update_buffer)),
    )
    .service(web::resource("/api/session/save").route(web::post().to(save_session)));
}
