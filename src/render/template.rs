use std::collections::BTreeMap;

use crate::error::RenderError;

/// Variables available to a template while rendering one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    pub operator_name: String,
    pub name: String,
    pub namespace: String,
    pub params: BTreeMap<String, String>,
    pub plan_name: String,
    pub phase_name: String,
    pub step_name: String,
    /// Zero-based position of the step inside its phase.
    pub step_number: usize,
}

impl TemplateContext {
    /// Resolves a dotted path such as `.Name` or `.Params.replicas`.
    pub fn lookup(&self, path: &str) -> Result<String, RenderError> {
        let path = path.strip_prefix('.').unwrap_or(path);
        if let Some(param) = path.strip_prefix("Params.") {
            return self
                .params
                .get(param)
                .cloned()
                .ok_or_else(|| RenderError::MissingParam(param.to_string()));
        }
        let value = match path {
            "OperatorName" => self.operator_name.clone(),
            "Name" => self.name.clone(),
            "Namespace" => self.namespace.clone(),
            "PlanName" => self.plan_name.clone(),
            "PhaseName" => self.phase_name.clone(),
            "StepName" => self.step_name.clone(),
            "StepNumber" => self.step_number.to_string(),
            other => return Err(RenderError::UnknownVariable(other.to_string())),
        };
        Ok(value)
    }
}

/// `render(template, context) -> text`. The expression syntax is the engine's business.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, context: &TemplateContext) -> Result<String, RenderError>;
}

/// Substitutes `{{ .Path }}` actions and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderEngine;

impl TemplateEngine for PlaceholderEngine {
    fn render(&self, template: &str, context: &TemplateContext) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let action_start = offset + start;
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(RenderError::Unterminated(action_start))?;
            let action = after_open[..end].trim();
            if !action.starts_with('.') || action.contains(char::is_whitespace) {
                return Err(RenderError::Malformed(action.to_string()));
            }
            out.push_str(&context.lookup(action)?);

            let consumed = start + 2 + end + 2;
            rest = &rest[consumed..];
            offset += consumed;
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TemplateContext {
        TemplateContext {
            operator_name: "zookeeper".into(),
            name: "zk".into(),
            namespace: "data".into(),
            params: [("replicas".to_string(), "3".to_string())].into_iter().collect(),
            plan_name: "deploy".into(),
            phase_name: "main".into(),
            step_name: "everything".into(),
            step_number: 1,
        }
    }

    #[test]
    fn test_render_substitutes_variables() {
        let out = PlaceholderEngine
            .render(
                "name: {{ .Name }}-{{.StepNumber}}\nreplicas: {{ .Params.replicas }}",
                &context(),
            )
            .unwrap();
        assert_eq!(out, "name: zk-1\nreplicas: 3");
    }

    #[test]
    fn test_render_without_actions_is_identity() {
        let text = "kind: ConfigMap\ndata: {}\n";
        assert_eq!(PlaceholderEngine.render(text, &context()).unwrap(), text);
    }

    #[test]
    fn test_render_errors() {
        let ctx = context();
        assert_eq!(
            PlaceholderEngine.render("{{ .Nope }}", &ctx),
            Err(RenderError::UnknownVariable("Nope".into()))
        );
        assert_eq!(
            PlaceholderEngine.render("{{ .Params.missing }}", &ctx),
            Err(RenderError::MissingParam("missing".into()))
        );
        assert_eq!(
            PlaceholderEngine.render("ok {{ .Name", &ctx),
            Err(RenderError::Unterminated(3))
        );
        assert_eq!(
            PlaceholderEngine.render("{{ if .Name }}", &ctx),
            Err(RenderError::Malformed("if .Name".into()))
        );
    }
}
