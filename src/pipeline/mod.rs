pub mod report;
pub mod diagnostic; // Run artifact dump (INCIDENT_COPILOT_DUMP_DIR)
