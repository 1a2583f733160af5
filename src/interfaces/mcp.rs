use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde_json::json;
use tokio::task;
use tracing::{debug, info, warn};

use crate::application::{
    dtos::{
        FacilityDetailsArgs, FindFacilitiesArgs, PatientDataArgs, ScheduleAppointmentArgs,
        ServiceSearchArgs,
    },
    services::{error_payload, FunctionCall, FunctionDispatcher},
};

/// Exposes the function catalog as MCP tools.
#[derive(Clone)]
pub struct CareNavMcpServer {
    dispatcher: Arc<FunctionDispatcher>,
    tool_router: ToolRouter<Self>,
}

impl CareNavMcpServer {
    pub fn new(dispatcher: Arc<FunctionDispatcher>) -> Self {
        Self {
            dispatcher,
            tool_router: Self::tool_router(),
        }
    }

    /// Runs one typed call off the async runtime. Domain failures are tool
    /// results with `isError` set, carrying the dispatcher's error payload.
    async fn run(&self, call: FunctionCall) -> Result<CallToolResult, McpError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let kind = call.kind();
        let outcome = task::spawn_blocking(move || dispatcher.execute(call))
            .await
            .map_err(|err| internal_error(err.to_string()))?;

        match outcome {
            Ok(value) => {
                debug!(target: "carenav::mcp", tool = %kind, "tool call finished");
                Ok(CallToolResult::structured(value))
            }
            Err(err) => {
                warn!(target: "carenav::mcp", tool = %kind, error = %err, "tool call failed");
                Ok(CallToolResult::structured_error(error_payload(&err)))
            }
        }
    }
}

#[tool_router]
impl CareNavMcpServer {
    #[tool(
        name = "find_healthcare_facilities",
        description = "Find healthcare facilities near a location or matching specific criteria"
    )]
    async fn find_healthcare_facilities(
        &self,
        Parameters(args): Parameters<FindFacilitiesArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(FunctionCall::FindHealthcareFacilities(args)).await
    }

    #[tool(
        name = "get_facility_details",
        description = "Get detailed information about a specific healthcare facility"
    )]
    async fn get_facility_details(
        &self,
        Parameters(args): Parameters<FacilityDetailsArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(FunctionCall::GetFacilityDetails(args)).await
    }

    #[tool(
        name = "search_facilities_by_service",
        description = "Search for facilities offering a specific healthcare service"
    )]
    async fn search_facilities_by_service(
        &self,
        Parameters(args): Parameters<ServiceSearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(FunctionCall::SearchFacilitiesByService(args)).await
    }

    #[tool(
        name = "get_patient_health_data",
        description = "Retrieve patient health records and information (requires authentication)"
    )]
    async fn get_patient_health_data(
        &self,
        Parameters(args): Parameters<PatientDataArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(FunctionCall::GetPatientHealthData(args)).await
    }

    #[tool(
        name = "schedule_appointment",
        description = "Schedule a healthcare appointment at a facility"
    )]
    async fn schedule_appointment(
        &self,
        Parameters(args): Parameters<ScheduleAppointmentArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(FunctionCall::ScheduleAppointment(args)).await
    }
}

#[tool_handler]
impl ServerHandler for CareNavMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "carenav-mcp".into(),
                title: Some("CareNav Facility Navigator".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Look up healthcare facilities, their services and attributes, and schedule \
                 appointments. Locations may be free text or \"lat,lon\"; only coordinates \
                 narrow results by radius."
                    .into(),
            ),
        }
    }
}

fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(
        "internal MCP server error",
        Some(json!({ "detail": message.into() })),
    )
}

/// Run the MCP server over stdin/stdout until the client disconnects.
pub async fn run_mcp_stdio_server(dispatcher: Arc<FunctionDispatcher>) -> Result<()> {
    info!(target: "carenav::mcp", "Starting MCP stdio server...");

    let service = CareNavMcpServer::new(dispatcher)
        .serve(stdio())
        .await
        .context("failed to start MCP stdio transport")?;
    let reason = service.waiting().await.context("MCP server task failed")?;

    info!(target: "carenav::mcp", ?reason, "MCP stdio server terminated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rmcp::{
        model::CallToolRequestParam,
        service::{RoleClient, RunningService, ServiceError},
    };
    use serde_json::Value;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        application::services::{description, sample_data, DispatchConfig, FacilityStore},
        domain::FunctionKind,
        infrastructure::SledFacilityStore,
    };

    async fn connect() -> (RunningService<RoleClient, ()>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store: Arc<dyn FacilityStore> = Arc::new(SledFacilityStore::open(dir.path()).unwrap());
        sample_data::seed_if_empty(store.as_ref()).unwrap();
        let dispatcher = Arc::new(FunctionDispatcher::new(store, DispatchConfig::default()));

        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = CareNavMcpServer::new(dispatcher);
        tokio::spawn(async move {
            if let Ok(running) = server.serve(server_io).await {
                let _ = running.waiting().await;
            }
        });

        let client = ().serve(client_io).await.unwrap();
        (client, dir)
    }

    async fn call(
        client: &RunningService<RoleClient, ()>,
        name: &'static str,
        arguments: Value,
    ) -> Result<CallToolResult, ServiceError> {
        client
            .call_tool(CallToolRequestParam {
                name: name.into(),
                arguments: arguments.as_object().cloned(),
            })
            .await
    }

    #[tokio::test]
    async fn initialize_and_list_tools() {
        let (client, _dir) = connect().await;

        let info = client.peer_info().unwrap();
        assert_eq!(info.server_info.name, "carenav-mcp");

        let tools = client.list_all_tools().await.unwrap();
        assert_eq!(tools.len(), FunctionKind::ALL.len());
        for kind in FunctionKind::ALL {
            let tool = tools.iter().find(|tool| tool.name == kind.name()).unwrap();
            assert_eq!(tool.description.as_deref(), Some(description(kind)));
        }

        let schedule = tools
            .iter()
            .find(|tool| tool.name == "schedule_appointment")
            .unwrap();
        let required = schedule.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|field| field == "facility_id"));
        assert!(required.iter().all(|field| field != "patient_id"));

        let _ = client.cancel().await;
    }

    #[tokio::test]
    async fn tool_calls_carry_structured_results() {
        let (client, _dir) = connect().await;

        let found = call(&client, "get_facility_details", json!({"facility_id": "hosp_001"}))
            .await
            .unwrap();
        assert_ne!(found.is_error, Some(true));
        let details = found.structured_content.unwrap();
        assert_eq!(details["name"], "City General Hospital");

        let missing = call(&client, "get_facility_details", json!({"facility_id": "missing_id"}))
            .await
            .unwrap();
        assert_eq!(missing.is_error, Some(true));
        let payload = missing.structured_content.unwrap();
        assert_eq!(payload["error"], "Facility missing_id not found");
        assert_eq!(payload["code"], "not_found");

        let _ = client.cancel().await;
    }

    #[tokio::test]
    async fn scheduling_through_a_tool_is_persisted() {
        let (client, _dir) = connect().await;

        let booked = call(
            &client,
            "schedule_appointment",
            json!({"facility_id": "clinic_001", "service_type": "pediatrics", "date": "2024-12-15"}),
        )
        .await
        .unwrap();
        assert_ne!(booked.is_error, Some(true));

        let details = call(&client, "get_facility_details", json!({"facility_id": "clinic_001"}))
            .await
            .unwrap()
            .structured_content
            .unwrap();
        assert_eq!(details["attributes"]["appointments"][0]["service_type"], "pediatrics");

        let _ = client.cancel().await;
    }

    #[tokio::test]
    async fn unknown_tools_and_bad_arguments_are_protocol_errors() {
        let (client, _dir) = connect().await;

        assert!(call(&client, "unsupported_op", json!({})).await.is_err());
        assert!(call(&client, "find_healthcare_facilities", json!({"service": "mri"}))
            .await
            .is_err());

        let _ = client.cancel().await;
    }
}
