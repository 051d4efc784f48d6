use super::RegistrationKind;

/// Group of fields rendered together, with its own status badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subsection {
    pub id: &'static str,
    pub title: &'static str,
    pub fields: &'static [&'static str],
}

/// One page of the registration wizard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormStep {
    pub id: &'static str,
    pub title: &'static str,
    pub subsections: &'static [Subsection],
}

impl FormStep {
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.subsections
            .iter()
            .flat_map(|subsection| subsection.fields.iter().copied())
    }
}

const CONTACT: Subsection = Subsection {
    id: "contact",
    title: "Contact Person",
    fields: &["contact.name", "contact.position", "contact.phone", "contact.email"],
};

const POSTAL_ADDRESS: Subsection = Subsection {
    id: "postalAddress",
    title: "Postal Address",
    fields: &["address.street", "address.city", "address.province", "address.postalCode"],
};

const BANK_ACCOUNT: Subsection = Subsection {
    id: "bankAccount",
    title: "Bank Account",
    fields: &[
        "bank.bankName",
        "bank.branchNumber",
        "bank.branchName",
        "bank.accountNumber",
        "bank.accountName",
    ],
};

const PRIVATE_PRACTICE_STEPS: &[FormStep] = &[
    FormStep {
        id: "practice",
        title: "Practice Details",
        subsections: &[
            Subsection {
                id: "practiceIdentity",
                title: "Practice",
                fields: &["practiceName", "practiceType", "medicalBoardNumber", "tin"],
            },
            POSTAL_ADDRESS,
        ],
    },
    FormStep {
        id: "practitioner",
        title: "Practitioner",
        subsections: &[
            Subsection {
                id: "principal",
                title: "Principal Practitioner",
                fields: &[
                    "practitioner.firstName",
                    "practitioner.lastName",
                    "practitioner.qualification",
                    "practitioner.yearsOfPractice",
                ],
            },
            CONTACT,
        ],
    },
    FormStep {
        id: "banking",
        title: "Banking",
        subsections: &[BANK_ACCOUNT],
    },
    FormStep {
        id: "documents",
        title: "Supporting Documents",
        subsections: &[Subsection {
            id: "uploads",
            title: "Uploads",
            fields: &["documents.practisingCertificate", "documents.bankStatement"],
        }],
    },
];

const HEALTH_AUTHORITY_STEPS: &[FormStep] = &[
    FormStep {
        id: "authority",
        title: "Authority Details",
        subsections: &[
            Subsection {
                id: "authorityIdentity",
                title: "Authority",
                fields: &["authorityName", "province", "tin"],
            },
            POSTAL_ADDRESS,
        ],
    },
    FormStep {
        id: "facilities",
        title: "Facilities",
        subsections: &[Subsection {
            id: "facilityProfile",
            title: "Facility Profile",
            fields: &["facilities.count", "facilities.hospitalName", "facilities.bedCount"],
        }],
    },
    FormStep {
        id: "contacts",
        title: "Contacts",
        subsections: &[
            CONTACT,
            Subsection {
                id: "ceo",
                title: "Chief Executive",
                fields: &["ceo.name", "ceo.phone", "ceo.email"],
            },
        ],
    },
    FormStep {
        id: "banking",
        title: "Banking",
        subsections: &[BANK_ACCOUNT],
    },
];

pub fn steps_for(kind: RegistrationKind) -> &'static [FormStep] {
    match kind {
        RegistrationKind::PrivatePractice => PRIVATE_PRACTICE_STEPS,
        RegistrationKind::HealthAuthority => HEALTH_AUTHORITY_STEPS,
    }
}
