use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::Role;

/// Action-level permission token checked by views before rendering controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    // Institutes
    ViewInstitutes,
    ManageInstitutes,
    // Users
    ViewUsers,
    ManageUsers,
    // Classes & subjects
    ViewClasses,
    ManageClasses,
    ViewSubjects,
    ManageSubjects,
    // Attendance
    ViewAttendance,
    MarkAttendance,
    // Homework
    ViewHomework,
    CreateHomework,
    SubmitHomework,
    GradeHomework,
    // Exams & grades
    ViewExams,
    CreateExams,
    ViewGrades,
    EnterGrades,
    // Lectures
    ViewLectures,
    ManageLectures,
    // Parents
    ViewChildProgress,
    // Transport
    ViewTransport,
    ManageTransport,
    MarkTransportAttendance,
    // Organizations
    ViewOrganizations,
    ManageOrganizations,
    ManageOrganizationMembers,
    // Administration
    ViewReports,
    ViewPayments,
    ManagePayments,
    ManageSettings,
}

impl Permission {
    pub const ALL: [Permission; 31] = [
        Permission::ViewInstitutes,
        Permission::ManageInstitutes,
        Permission::ViewUsers,
        Permission::ManageUsers,
        Permission::ViewClasses,
        Permission::ManageClasses,
        Permission::ViewSubjects,
        Permission::ManageSubjects,
        Permission::ViewAttendance,
        Permission::MarkAttendance,
        Permission::ViewHomework,
        Permission::CreateHomework,
        Permission::SubmitHomework,
        Permission::GradeHomework,
        Permission::ViewExams,
        Permission::CreateExams,
        Permission::ViewGrades,
        Permission::EnterGrades,
        Permission::ViewLectures,
        Permission::ManageLectures,
        Permission::ViewChildProgress,
        Permission::ViewTransport,
        Permission::ManageTransport,
        Permission::MarkTransportAttendance,
        Permission::ViewOrganizations,
        Permission::ManageOrganizations,
        Permission::ManageOrganizationMembers,
        Permission::ViewReports,
        Permission::ViewPayments,
        Permission::ManagePayments,
        Permission::ManageSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewInstitutes => "view-institutes",
            Permission::ManageInstitutes => "manage-institutes",
            Permission::ViewUsers => "view-users",
            Permission::ManageUsers => "manage-users",
            Permission::ViewClasses => "view-classes",
            Permission::ManageClasses => "manage-classes",
            Permission::ViewSubjects => "view-subjects",
            Permission::ManageSubjects => "manage-subjects",
            Permission::ViewAttendance => "view-attendance",
            Permission::MarkAttendance => "mark-attendance",
            Permission::ViewHomework => "view-homework",
            Permission::CreateHomework => "create-homework",
            Permission::SubmitHomework => "submit-homework",
            Permission::GradeHomework => "grade-homework",
            Permission::ViewExams => "view-exams",
            Permission::CreateExams => "create-exams",
            Permission::ViewGrades => "view-grades",
            Permission::EnterGrades => "enter-grades",
            Permission::ViewLectures => "view-lectures",
            Permission::ManageLectures => "manage-lectures",
            Permission::ViewChildProgress => "view-child-progress",
            Permission::ViewTransport => "view-transport",
            Permission::ManageTransport => "manage-transport",
            Permission::MarkTransportAttendance => "mark-transport-attendance",
            Permission::ViewOrganizations => "view-organizations",
            Permission::ManageOrganizations => "manage-organizations",
            Permission::ManageOrganizationMembers => "manage-organization-members",
            Permission::ViewReports => "view-reports",
            Permission::ViewPayments => "view-payments",
            Permission::ManagePayments => "manage-payments",
            Permission::ManageSettings => "manage-settings",
        }
    }

    pub fn parse(value: &str) -> Option<Permission> {
        let value = value.trim();
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::parse(s).ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

// =============================================================================
// ROLE -> PERMISSION TABLE
// =============================================================================

const INSTITUTE_ADMIN: &[Permission] = &[
    Permission::ViewInstitutes,
    Permission::ManageInstitutes,
    Permission::ViewUsers,
    Permission::ManageUsers,
    Permission::ViewClasses,
    Permission::ManageClasses,
    Permission::ViewSubjects,
    Permission::ManageSubjects,
    Permission::ViewAttendance,
    Permission::MarkAttendance,
    Permission::ViewHomework,
    Permission::ViewExams,
    Permission::ViewGrades,
    Permission::ViewLectures,
    Permission::ManageLectures,
    Permission::ViewTransport,
    Permission::ManageTransport,
    Permission::ViewReports,
    Permission::ViewPayments,
    Permission::ManagePayments,
    Permission::ManageSettings,
];

const TEACHER: &[Permission] = &[
    Permission::ViewUsers,
    Permission::ViewClasses,
    Permission::ViewSubjects,
    Permission::ViewAttendance,
    Permission::MarkAttendance,
    Permission::ViewHomework,
    Permission::CreateHomework,
    Permission::GradeHomework,
    Permission::ViewExams,
    Permission::CreateExams,
    Permission::ViewGrades,
    Permission::EnterGrades,
    Permission::ViewLectures,
    Permission::ManageLectures,
];

const STUDENT: &[Permission] = &[
    Permission::ViewClasses,
    Permission::ViewSubjects,
    Permission::ViewAttendance,
    Permission::ViewHomework,
    Permission::SubmitHomework,
    Permission::ViewExams,
    Permission::ViewGrades,
    Permission::ViewLectures,
    Permission::ViewPayments,
];

const PARENT: &[Permission] = &[
    Permission::ViewChildProgress,
    Permission::ViewAttendance,
    Permission::ViewHomework,
    Permission::ViewGrades,
    Permission::ViewPayments,
    Permission::ViewTransport,
];

const DRIVER: &[Permission] = &[
    Permission::ViewTransport,
    Permission::MarkTransportAttendance,
];

const STAFF: &[Permission] = &[
    Permission::ViewUsers,
    Permission::ViewClasses,
    Permission::ViewAttendance,
    Permission::ViewReports,
    Permission::ViewPayments,
];

const ORGANIZATION_MANAGER: &[Permission] = &[
    Permission::ViewOrganizations,
    Permission::ManageOrganizations,
    Permission::ManageOrganizationMembers,
    Permission::ViewLectures,
    Permission::ManageLectures,
];

const ATTENDANCE_MARKER: &[Permission] = &[
    Permission::ViewAttendance,
    Permission::MarkAttendance,
];

const USER: &[Permission] = &[Permission::ViewOrganizations];

/// Static grants for `role`. The match is exhaustive so a new role cannot be
/// added without deciding its grants.
pub fn granted(role: Role) -> &'static [Permission] {
    match role {
        Role::SuperAdmin => &Permission::ALL,
        Role::InstituteAdmin => INSTITUTE_ADMIN,
        Role::Teacher => TEACHER,
        Role::Student => STUDENT,
        Role::Parent => PARENT,
        Role::Driver => DRIVER,
        Role::Staff => STAFF,
        Role::OrganizationManager => ORGANIZATION_MANAGER,
        Role::AttendanceMarker => ATTENDANCE_MARKER,
        Role::User => USER,
    }
}

// =============================================================================
// STATIC ROUTE -> PERMISSION TABLE
// =============================================================================

const ROUTE_PERMISSIONS: &[(&str, Permission)] = &[
    ("/institutes", Permission::ViewInstitutes),
    ("/users", Permission::ViewUsers),
    ("/classes", Permission::ViewClasses),
    ("/subjects", Permission::ViewSubjects),
    ("/attendance", Permission::ViewAttendance),
    ("/mark-attendance", Permission::MarkAttendance),
    ("/homework", Permission::ViewHomework),
    ("/exams", Permission::ViewExams),
    ("/grades", Permission::ViewGrades),
    ("/lectures", Permission::ViewLectures),
    ("/my-children", Permission::ViewChildProgress),
    ("/transport", Permission::ViewTransport),
    ("/transport-attendance", Permission::MarkTransportAttendance),
    ("/organizations", Permission::ViewOrganizations),
    ("/reports", Permission::ViewReports),
    ("/payments", Permission::ViewPayments),
    ("/settings", Permission::ManageSettings),
];

/// Permission guarding a static console path. Query string, fragment and a
/// trailing slash are ignored; anything not in the table yields `None`.
pub fn route_permission(path: &str) -> Option<Permission> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    ROUTE_PERMISSIONS
        .iter()
        .find(|(route, _)| *route == path)
        .map(|(_, permission)| *permission)
}
