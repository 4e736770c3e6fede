//! Downloadable CSV template for users preparing an import.

const TEMPLATE: &str = "\
first_name,last_name,email,phone,company,job_title,notes
John,Doe,john.doe@example.com,555-0100,Acme Corp,CEO,Important lead from Q4 conference
Jane,Smith,jane.smith@techstart.com,555-0101,TechStart Inc,CTO,Met at AWS Summit 2024
";

/// The template file offered to users, header plus two example rows.
pub fn csv_template() -> &'static str {
    TEMPLATE
}
