//! OpenAPI document served to Swagger UI at `/docs`.

use utoipa::OpenApi;

use rinova_core::{
    AlternativeCode, CPTCode, CodeCategory, CodeFrequency, DailyCount, DashboardStats,
    DocumentationGap, Evidence, ExtractionMetadata, ExtractionResult, GapImpact,
    GapRecommendation, HCPCSCode, ICD10Code, MedicalNote, Modifier, NoteSortField, NoteStatus,
    PerformanceMetrics, QualityScores, QueueStatusEntry, SortOrder, StorageStats, SystemStats,
    Timeframe,
};

use crate::error::{ErrorDetail, ErrorEnvelope};
use crate::handlers::{admin, extraction, notes, system};
use crate::query_types::PageInfo;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rinova API",
        description = "Medical code extraction (ICD-10, CPT, HCPCS, modifiers) from clinical notes"
    ),
    paths(
        system::root,
        system::health_check,
        extraction::extract,
        extraction::extract_batch,
        notes::list_notes,
        notes::search_notes,
        notes::dashboard,
        notes::get_note,
        notes::reprocess_note,
        admin::system_stats,
        admin::queue_status,
        admin::performance_metrics,
        admin::cleanup,
        admin::reprocess_failed,
        admin::optimize,
    ),
    components(schemas(
        system::WelcomeResponse,
        system::HealthReport,
        system::ServiceHealth,
        extraction::ExtractRequest,
        extraction::BatchExtractRequest,
        extraction::ExtractionResponse,
        notes::NotesPage,
        admin::CleanupResponse,
        admin::RequeueResponse,
        admin::OptimizeResponse,
        PageInfo,
        ErrorEnvelope,
        ErrorDetail,
        MedicalNote,
        NoteStatus,
        NoteSortField,
        SortOrder,
        ExtractionResult,
        ExtractionMetadata,
        ICD10Code,
        CPTCode,
        AlternativeCode,
        HCPCSCode,
        Modifier,
        Evidence,
        DocumentationGap,
        GapImpact,
        GapRecommendation,
        CodeCategory,
        CodeFrequency,
        DailyCount,
        QualityScores,
        DashboardStats,
        SystemStats,
        StorageStats,
        QueueStatusEntry,
        Timeframe,
        PerformanceMetrics,
    )),
    tags(
        (name = "Extraction", description = "Code extraction from clinical text"),
        (name = "Notes", description = "Stored notes and dashboard"),
        (name = "Search", description = "Full-text search"),
        (name = "Admin", description = "Statistics and maintenance"),
        (name = "System", description = "Health checks and service info")
    )
)]
pub struct ApiDoc;
