use serde::Deserialize;
use serde::Serialize;

/// One entry of the static subject catalog. Configuration data, not part of a
/// user's subscription set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCatalog {
    pub subjects: Vec<Subject>,
}

impl SubjectCatalog {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.subjects.iter().any(|subject| subject.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|subject| subject.id == id)
    }

    /// Catalog shipped with the client, used when no YAML file is configured.
    pub fn builtin() -> Self {
        fn subject(id: &str, name: &str, icon: &str, description: &str) -> Subject {
            Subject {
                id: id.to_string(),
                name: name.to_string(),
                icon: icon.to_string(),
                description: description.to_string(),
            }
        }

        Self {
            subjects: vec![
                subject(
                    "ingenieria_de_servidores",
                    "Ingeniería de Servidores",
                    "💻",
                    "Gestión y configuración de servidores",
                ),
                subject(
                    "modelos_avanzados_computacion",
                    "Modelos Avanzados de Computación",
                    "🧠",
                    "Técnicas avanzadas de computación",
                ),
                subject(
                    "metaheuristicas",
                    "Metaheurísticas",
                    "🔍",
                    "Algoritmos de optimización",
                ),
                subject(
                    "inferencia_estadistica_1",
                    "Inferencia Estadistica I (Estadistica)",
                    "📄",
                    "",
                ),
                subject(
                    "estadistica",
                    "Estadistica (Ingeniería Informática)",
                    "📄",
                    "",
                ),
            ],
        }
    }
}

impl Default for SubjectCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
